//! External k-mer counting engine.
//!
//! The counting engine is a separate toolchain exposing two binaries in one
//! directory: `count` (writes a lexicographically sorted `kmer\tcount` file)
//! and `stream` (emits k-mers to stdout as they are read, optionally with a
//! running index). The pipeline only depends on the [`KmerSource`] stream
//! contract, so tests substitute an in-memory source.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use rustc_hash::FxHashMap;

use crate::counts::{KmerCount, KmerCountIter, KmerCountReader, Result, StreamError};

/// A lazy stream of count records.
pub type KmerStream = Box<dyn Iterator<Item = Result<KmerCount>>>;

/// Produces k-mer count streams for a set of sequence inputs.
pub trait KmerSource {
    /// Count k-mers of length `k` across `inputs` into a lexicographically
    /// sorted `kmer\tcount` file at `out`.
    fn count_sorted(&self, k: usize, inputs: &[PathBuf], out: &Path) -> Result<()>;

    /// Stream k-mers of length `k` across `inputs` in read order. With
    /// `indexed`, the record value is a running position instead of a
    /// count.
    fn stream(&self, k: usize, inputs: &[PathBuf], indexed: bool) -> Result<KmerStream>;
}

/// [`KmerSource`] backed by the external engine binaries.
pub struct ExternalEngine {
    dir: PathBuf,
    format: String,
    scratch: Option<PathBuf>,
}

impl ExternalEngine {
    /// Point at the directory containing the `count` and `stream`
    /// binaries.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            format: "fasta".to_string(),
            scratch: None,
        }
    }

    /// Input sequence format passed through to the engine (default
    /// `fasta`).
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Scratch directory handed to the engine for its temporary files.
    pub fn with_scratch<P: Into<PathBuf>>(mut self, scratch: P) -> Self {
        self.scratch = Some(scratch.into());
        self
    }

    fn base_command(&self, binary: &str, k: usize) -> Command {
        let mut cmd = Command::new(self.dir.join(binary));
        cmd.arg("-k").arg(k.to_string());
        cmd.arg("-f").arg(&self.format);
        if let Some(scratch) = &self.scratch {
            cmd.arg("-t").arg(scratch);
        }
        cmd
    }
}

impl KmerSource for ExternalEngine {
    fn count_sorted(&self, k: usize, inputs: &[PathBuf], out: &Path) -> Result<()> {
        let mut cmd = self.base_command("count", k);
        cmd.arg("-o").arg(out);
        cmd.args(inputs);

        log::info!("Running counting engine: {:?}", cmd);
        let status = cmd.status()?;
        if !status.success() {
            return Err(StreamError::Engine {
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn stream(&self, k: usize, inputs: &[PathBuf], indexed: bool) -> Result<KmerStream> {
        let mut cmd = self.base_command("stream", k);
        cmd.arg("--stdout");
        if indexed {
            cmd.arg("--index");
        }
        cmd.args(inputs);
        cmd.stdout(Stdio::piped());

        log::info!("Streaming from counting engine: {:?}", cmd);
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::InvalidFormat("engine stdout not captured".to_string()))?;

        Ok(Box::new(EngineStream {
            records: KmerCountReader::new(stdout).records(),
            child: Some(child),
        }))
    }
}

/// Iterator over a child process's stdout records.
///
/// The pipe has bounded capacity, so records are drained as the child
/// produces them; the child is waited on (and its exit status checked)
/// only after the stream hits EOF.
struct EngineStream {
    records: KmerCountIter<ChildStdout>,
    child: Option<Child>,
}

impl Iterator for EngineStream {
    type Item = Result<KmerCount>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.records.next() {
            return Some(item);
        }

        // EOF: reap the child exactly once and surface a bad exit.
        let mut child = self.child.take()?;
        match child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(StreamError::Engine {
                code: status.code().unwrap_or(-1),
            })),
            Err(e) => Some(Err(StreamError::Io(e))),
        }
    }
}

/// In-memory [`KmerSource`] keyed by k; used by tests and library callers
/// that already hold their count records.
#[derive(Debug, Default)]
pub struct VecSource {
    by_k: FxHashMap<usize, Vec<KmerCount>>,
}

impl VecSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the records served for one k-mer length.
    pub fn with_records(mut self, k: usize, records: Vec<KmerCount>) -> Self {
        self.by_k.insert(k, records);
        self
    }

    fn records_for(&self, k: usize) -> Vec<KmerCount> {
        self.by_k.get(&k).cloned().unwrap_or_default()
    }
}

impl KmerSource for VecSource {
    fn count_sorted(&self, k: usize, _inputs: &[PathBuf], out: &Path) -> Result<()> {
        let mut records = self.records_for(k);
        records.sort_by(|a, b| a.kmer.cmp(&b.kmer));

        let mut file = std::fs::File::create(out)?;
        for record in records {
            writeln!(file, "{}\t{}", record.kmer, record.value)?;
        }
        Ok(())
    }

    fn stream(&self, k: usize, _inputs: &[PathBuf], indexed: bool) -> Result<KmerStream> {
        let records = self.records_for(k);
        let iter = records.into_iter().enumerate().map(move |(i, mut rec)| {
            if indexed {
                rec.value = i as u64;
            }
            Ok(rec)
        });
        Ok(Box::new(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kc(kmer: &str, value: u64) -> KmerCount {
        KmerCount {
            kmer: kmer.to_string(),
            value,
        }
    }

    #[test]
    fn test_vec_source_count_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("counts.kc");

        let source = VecSource::new().with_records(4, vec![kc("TTTT", 1), kc("AAAA", 2)]);
        source.count_sorted(4, &[], &out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "AAAA\t2\nTTTT\t1\n");
    }

    #[test]
    fn test_vec_source_stream_indexed() {
        let source = VecSource::new().with_records(4, vec![kc("ACGT", 9), kc("TTTT", 9)]);
        let records: Vec<_> = source
            .stream(4, &[], true)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records[0], kc("ACGT", 0));
        assert_eq!(records[1], kc("TTTT", 1));
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_external_stream_drains_and_reaps() {
        let dir = tempfile::tempdir().unwrap();
        fake_engine(
            dir.path(),
            "stream",
            "#!/bin/sh\nprintf 'ACGT\\t0\\nTTTT\\t1\\n'\n",
        );

        let engine = ExternalEngine::new(dir.path());
        let records: Vec<_> = engine
            .stream(4, &[], true)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records, vec![kc("ACGT", 0), kc("TTTT", 1)]);
    }

    #[test]
    #[cfg(unix)]
    fn test_external_stream_surfaces_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        fake_engine(dir.path(), "stream", "#!/bin/sh\nexit 3\n");

        let engine = ExternalEngine::new(dir.path());
        let result: Result<Vec<_>> = engine.stream(4, &[], false).unwrap().collect();

        match result {
            Err(StreamError::Engine { code }) => assert_eq!(code, 3),
            other => panic!("expected engine error, got {:?}", other),
        }
    }
}
