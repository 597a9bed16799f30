//! Gene interval table for genic-membership lookups.
//!
//! Parses gene files (tab-delimited: `name\tstart\tend`, 1-based inclusive
//! coordinates). Intervals are kept sorted by start and must not overlap;
//! ends are pulled in by `k - 1` at load time so that a k-mer *starting*
//! inside an interval is fully contained by the original gene span.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::counts::{Result, StreamError};

/// A named 1-based inclusive genomic interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneInterval {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Sorted, non-overlapping gene interval table with point queries.
///
/// Built once from a gene file, read-only afterwards.
#[derive(Debug, Default)]
pub struct GeneIndex {
    /// Sorted by start; pairwise disjoint.
    entries: Vec<(GeneInterval, usize)>,
    file: String,
}

impl GeneIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a gene file, adjusting ends for k-mers of length `k`.
    ///
    /// Blank lines and `#` comments are ignored. Everything else must be a
    /// valid record; any malformed record is fatal with its line number.
    pub fn from_file<P: AsRef<Path>>(path: P, k: usize) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut index = Self {
            entries: Vec::new(),
            file: file_name.clone(),
        };

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let interval = parse_gene_record(line, k, &file_name, line_no)?;
            index.insert(interval, line_no)?;
        }

        log::debug!("Loaded {} gene intervals from {}", index.len(), file_name);
        Ok(index)
    }

    /// Insert an interval, keeping the table sorted by start.
    ///
    /// An interval overlapping an existing entry is a fatal configuration
    /// error naming both records and their source line numbers.
    pub fn insert(&mut self, interval: GeneInterval, line_no: usize) -> Result<()> {
        let at = self
            .entries
            .partition_point(|(g, _)| g.start < interval.start);

        // Only the neighbors can overlap in a sorted disjoint table
        for neighbor in [at.checked_sub(1), Some(at)].into_iter().flatten() {
            if let Some((other, other_line)) = self.entries.get(neighbor) {
                if interval.start <= other.end && other.start <= interval.end {
                    return Err(StreamError::Parse {
                        file: self.file.clone(),
                        line: line_no,
                        message: format!(
                            "gene record overlaps another entry ({}: {} - {} at line {}, {}: {} - {})",
                            other.name,
                            other.start,
                            other.end,
                            other_line,
                            interval.name,
                            interval.start,
                            interval.end,
                        ),
                    });
                }
            }
        }

        self.entries.insert(at, (interval, line_no));
        Ok(())
    }

    /// Number of intervals in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no interval was loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the interval containing `pos`, if any.
    ///
    /// Binary search over the sorted disjoint table: skip every interval
    /// ending before `pos`, then check the first remaining one for
    /// containment.
    pub fn find(&self, pos: u64) -> Option<&GeneInterval> {
        let at = self.entries.partition_point(|(g, _)| g.end < pos);
        match self.entries.get(at) {
            Some((g, _)) if g.start <= pos && pos <= g.end => Some(g),
            _ => None,
        }
    }
}

/// Parse and validate one `name\tstart\tend` record.
fn parse_gene_record(line: &str, k: usize, file: &str, line_no: usize) -> Result<GeneInterval> {
    let parse_err = |message: String| StreamError::Parse {
        file: file.to_string(),
        line: line_no,
        message,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        return Err(parse_err(format!(
            "gene record must contain 3 tab-separated fields, got {}",
            fields.len()
        )));
    }

    let name = fields[0].trim();
    if name.is_empty() {
        return Err(parse_err("gene name must not be empty".to_string()));
    }

    let start: u64 = fields[1]
        .parse()
        .map_err(|_| parse_err(format!("invalid gene start: '{}'", fields[1])))?;
    let end: u64 = fields[2]
        .parse()
        .map_err(|_| parse_err(format!("invalid gene end: '{}'", fields[2])))?;

    if start == 0 || end == 0 {
        return Err(parse_err(
            "gene positions must not be 0 or negative".to_string(),
        ));
    }
    if start >= end {
        return Err(parse_err(
            "gene must stop at a position greater than its start".to_string(),
        ));
    }

    // K-mers must fall entirely within the gene: pull the end in so that a
    // k-mer starting at any position up to the adjusted end still fits.
    let adjusted_end = (end + 1).checked_sub(k as u64).unwrap_or(0);
    if adjusted_end < start {
        return Err(parse_err(
            "gene is shorter than the k-mer size (no k-mers fit inside it)".to_string(),
        ));
    }

    Ok(GeneInterval {
        name: name.to_string(),
        start,
        end: adjusted_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gene(name: &str, start: u64, end: u64) -> GeneInterval {
        GeneInterval {
            name: name.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_from_file_and_query() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# genes").unwrap();
        writeln!(file, "geneA\t100\t200").unwrap();
        writeln!(file, "geneB\t300\t400").unwrap();

        // k = 21: geneA covers starts 100..=180
        let index = GeneIndex::from_file(file.path(), 21).unwrap();
        assert_eq!(index.len(), 2);

        let hit = index.find(150).unwrap();
        assert_eq!(hit.name, "geneA");

        assert!(index.find(50).is_none());
        assert!(index.find(190).is_none()); // past the adjusted end
        assert!(index.find(500).is_none()); // past every interval
        assert_eq!(index.find(350).unwrap().name, "geneB");
    }

    #[test]
    fn test_unsorted_input_is_sorted_on_insert() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "geneB\t300\t400").unwrap();
        writeln!(file, "geneA\t100\t200").unwrap();

        let index = GeneIndex::from_file(file.path(), 21).unwrap();
        assert_eq!(index.find(120).unwrap().name, "geneA");
        assert_eq!(index.find(320).unwrap().name, "geneB");
    }

    #[test]
    fn test_overlap_is_rejected() {
        let mut index = GeneIndex::new();
        index.insert(gene("g1", 100, 200), 1).unwrap();

        let err = index.insert(gene("g2", 150, 250), 2).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("overlaps"));
        assert!(msg.contains("g1"));
        assert!(msg.contains("g2"));

        // Touching at a single position is still an overlap
        assert!(index.insert(gene("g3", 200, 300), 3).is_err());
        // Disjoint neighbor is fine
        assert!(index.insert(gene("g4", 201, 300), 4).is_ok());
    }

    #[test]
    fn test_bad_records_are_fatal() {
        for bad in [
            "geneA\t100",                // wrong field count
            "geneA\t0\t200",             // zero start
            "geneA\t200\t100",           // inverted
            "geneA\t100\t100",           // start == end
            "\t100\t200",                // empty name
            "geneA\tx\t200",             // non-numeric
            "geneA\t100\t110",           // shorter than k = 21
        ] {
            let mut file = NamedTempFile::new().unwrap();
            writeln!(file, "{}", bad).unwrap();
            let result = GeneIndex::from_file(file.path(), 21);
            assert!(result.is_err(), "expected rejection of {:?}", bad);
        }
    }

    #[test]
    fn test_error_carries_file_and_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "geneA\t100\t200").unwrap();
        writeln!(file, "geneA\tbroken\t200").unwrap();

        let err = GeneIndex::from_file(file.path(), 21).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(":2:"), "missing line number in {msg}");
    }
}
