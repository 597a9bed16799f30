//! K-mer conservation scores: table loading, lookups, and the builder that
//! derives a table from reference sequences.
//!
//! Table files are comma-delimited `kmer,score` with scores in `[0,1]`.
//! Keys are normalized to the RNA alphabet (uppercase, `T` -> `U`) so DNA
//! and RNA spellings of the same k-mer share an entry.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::counts::{Result, StreamError};
use crate::kmer::normalize_rna;

/// Mapping of fixed-length k-mers to conservation scores in `[0,1]`.
///
/// Built once from a file (or the accumulator below), read-only afterwards.
#[derive(Debug, Default)]
pub struct ConservationTable {
    scores: FxHashMap<String, f64>,
}

impl ConservationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `kmer,score` file.
    ///
    /// Blank lines and `#` comments are ignored. A record with the wrong
    /// field count, an unparseable score, or a score outside `[0,1]` is
    /// fatal with its file name and line number. Duplicate k-mers
    /// overwrite.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut scores = FxHashMap::default();

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parse_err = |message: String| StreamError::Parse {
                file: file_name.clone(),
                line: line_no,
                message,
            };

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 2 {
                return Err(parse_err(
                    "conservation record must contain kmer and score".to_string(),
                ));
            }

            let kmer = normalize_rna(fields[0].trim());
            let score: f64 = fields[1]
                .trim()
                .parse()
                .map_err(|_| parse_err(format!("invalid conservation score: '{}'", fields[1])))?;

            if !(0.0..=1.0).contains(&score) {
                return Err(parse_err(format!(
                    "conservation score must be between 0 and 1, got {}",
                    score
                )));
            }

            scores.insert(kmer, score);
        }

        log::debug!("Loaded {} conservation scores from {}", scores.len(), file_name);
        Ok(Self { scores })
    }

    /// Number of scored k-mers.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Look up a k-mer's score. The query is normalized the same way the
    /// table keys were.
    pub fn get(&self, kmer: &str) -> Option<f64> {
        self.scores.get(&normalize_rna(kmer)).copied()
    }

    /// Threshold filter: true only if the k-mer's score strictly exceeds
    /// `threshold`. A k-mer absent from the table does not pass.
    pub fn exceeds(&self, kmer: &str, threshold: f64) -> bool {
        match self.get(kmer) {
            Some(score) => score > threshold,
            None => false,
        }
    }
}

/// Accumulates per-record k-mer occurrences into a conservation table.
///
/// Each reference record contributes each of its distinct k-mers once; the
/// final score for a k-mer is the fraction of records containing it.
#[derive(Debug, Default)]
pub struct ConservationAccumulator {
    occurrences: FxHashMap<String, u64>,
    records: u64,
}

impl ConservationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's k-mer stream into the accumulator. Repeated
    /// k-mers within the record count once.
    pub fn add_record<I>(&mut self, kmers: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.records += 1;
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for kmer in kmers {
            if seen.insert(kmer.clone()) {
                *self.occurrences.entry(kmer).or_insert(0) += 1;
            }
        }
    }

    /// Number of records folded in so far.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Finish into `(kmer, score)` rows, sorted by k-mer for stable output.
    pub fn finish(self) -> Vec<(String, f64)> {
        let records = self.records.max(1) as f64;
        let mut rows: Vec<(String, f64)> = self
            .occurrences
            .into_iter()
            .map(|(kmer, n)| (kmer, n as f64 / records))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}
