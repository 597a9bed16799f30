//! Streaming reader for k-mer count files and streams.
//!
//! The counting engine emits tab-delimited lines of `sequence<TAB>count`
//! (in indexed mode the second field is a running position instead of a
//! count). Consumers key off the first field; the second is carried through
//! to output where requested.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use memchr::memchr;
use thiserror::Error;

/// Errors that can occur while loading or streaming toolkit inputs.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Invalid input: {0}")]
    InvalidFormat(String),

    #[error("Counting engine exited with code {code}")]
    Engine { code: i32 },
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// One record of a count stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerCount {
    pub kmer: String,
    /// Count, or running index in indexed streams.
    pub value: u64,
}

/// Parse a `kmer<TAB>value` line. Returns `None` for lines with fewer than
/// two fields or a non-numeric second field; such lines are skipped rather
/// than reported (short lines are a tolerated data-shape anomaly, not an
/// error).
#[inline]
pub fn parse_kmer_count(line: &[u8]) -> Option<KmerCount> {
    let tab = memchr(b'\t', line)?;
    let kmer = std::str::from_utf8(&line[..tab]).ok()?;
    if kmer.is_empty() {
        return None;
    }

    let rest = &line[tab + 1..];
    let end = memchr(b'\t', rest).unwrap_or(rest.len());
    let value: u64 = std::str::from_utf8(&rest[..end])
        .ok()?
        .trim_end()
        .parse()
        .ok()?;

    Some(KmerCount {
        kmer: kmer.to_string(),
        value,
    })
}

/// Check if a line should be skipped outright (empty or comment).
#[inline]
pub fn should_skip_line(line: &[u8]) -> bool {
    line.is_empty() || line[0] == b'#'
}

/// A streaming reader over `kmer<TAB>value` lines.
pub struct KmerCountReader<R: Read> {
    reader: BufReader<R>,
    buffer: String,
}

impl KmerCountReader<File> {
    /// Open a plain count file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read> KmerCountReader<R> {
    /// Create a reader from any readable source.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::with_capacity(64),
        }
    }

    /// Read the next well-formed record, skipping blank lines, comments,
    /// and short lines.
    pub fn read_record(&mut self) -> Result<Option<KmerCount>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }

            let line = self.buffer.trim_end();
            if should_skip_line(line.as_bytes()) {
                continue;
            }

            if let Some(record) = parse_kmer_count(line.as_bytes()) {
                return Ok(Some(record));
            }
            // Short or malformed line: tolerated, move on.
        }
    }

    /// Consume the reader as an iterator of records.
    pub fn records(self) -> KmerCountIter<R> {
        KmerCountIter { reader: self }
    }
}

/// Iterator over count records.
pub struct KmerCountIter<R: Read> {
    reader: KmerCountReader<R>,
}

impl<R: Read> Iterator for KmerCountIter<R> {
    type Item = Result<KmerCount>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Open a count file for reading, transparently decoding gzip.
///
/// `force_gz` overrides extension sniffing: `Some(true)` always decodes,
/// `Some(false)` never does, `None` decodes when the path ends in `.gz`.
pub fn open_count_file<P: AsRef<Path>>(path: P, force_gz: Option<bool>) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let is_gz = force_gz.unwrap_or_else(|| {
        path.extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false)
    });

    if is_gz {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}
