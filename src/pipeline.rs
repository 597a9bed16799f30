//! Pipeline drivers: the filter sweep, the annotation pass, and the
//! conservation-table builder.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conservation::{ConservationAccumulator, ConservationTable};
use crate::counts::{open_count_file, KmerCountReader, Result};
use crate::engine::KmerSource;
use crate::filter::FilterSet;
use crate::genes::GeneIndex;
use crate::kmer::reverse_complement;
use crate::output::CsvWriter;
use crate::rules::{
    ConservationAnnotation, ConservationThreshold, GcProfile, GeneMembership, RuleSet,
};

/// Counters reported by the filter sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KfilterStats {
    pub records: u64,
    pub kept: u64,
}

impl fmt::Display for KfilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} k-mers processed, {} kept", self.records, self.kept)
    }
}

/// Build a sub-k-mer filter set and sweep the full k-mer stream against it.
///
/// Output rows are `kmer,passFlag[,index]` where the flag is `1` for kept
/// k-mers and `0` for filtered ones.
#[derive(Debug, Clone)]
pub struct KfilterCommand {
    /// Full k-mer length.
    pub k: usize,
    /// Sub-k-mer (filter probe) length.
    pub sub_k: usize,
    /// Gzip handling for the filter file: `None` sniffs the extension.
    pub filter_gz: Option<bool>,
    /// Emit the stream index as a third output column.
    pub indexed: bool,
}

impl Default for KfilterCommand {
    fn default() -> Self {
        Self {
            k: 21,
            sub_k: 16,
            filter_gz: None,
            indexed: true,
        }
    }
}

impl KfilterCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<W: Write>(
        &self,
        source: &dyn KmerSource,
        inputs: &[PathBuf],
        filter_path: &Path,
        scratch: &Path,
        out: &mut W,
    ) -> Result<KfilterStats> {
        // Sorted sub-k-mers of the target go to a scratch file first; the
        // engine sorts count output, which the merge below relies on.
        let target_sub = scratch.join("targetsub.kc");
        source.count_sorted(self.sub_k, inputs, &target_sub)?;

        let target = KmerCountReader::from_path(&target_sub)?;
        let unwanted = KmerCountReader::new(open_count_file(filter_path, self.filter_gz)?);
        let filter = FilterSet::from_sorted_readers(target, unwanted, self.sub_k)?;
        log::info!("Loaded {} sub-k-mers into the filter set", filter.len());

        let mut writer = CsvWriter::new(out);
        let mut stats = KfilterStats::default();

        for record in source.stream(self.k, inputs, self.indexed)? {
            let record = record?;
            let pass = filter.passes(&record.kmer);

            stats.records += 1;
            if pass {
                stats.kept += 1;
            }

            writer.field(&record.kmer)?;
            writer.int_field(if pass { 1u8 } else { 0u8 })?;
            if self.indexed {
                writer.int_field(record.value)?;
            }
            writer.end_row()?;
        }

        writer.flush()?;
        log::info!("{}", stats);
        Ok(stats)
    }
}

/// Score filtered k-mers with the annotation battery.
///
/// Reads `kmer,passFlag[,position]` rows, evaluates the configured rules on
/// the forward strand (and the reverse complement in dual-strand mode), and
/// writes one diagnostic CSV row per input record.
#[derive(Debug, Clone)]
pub struct AnnotateCommand {
    /// Full k-mer length; gene-interval ends are adjusted by it.
    pub k: usize,
    pub profile: GcProfile,
    pub gene_file: Option<PathBuf>,
    pub conservation_file: Option<PathBuf>,
    /// Conservation cutoff for the threshold rule.
    pub threshold: f64,
    /// Keep gene/conservation lookups annotation-only (no score effect).
    pub annotate_only: bool,
    /// Evaluate the reverse complement alongside the forward strand.
    pub reverse: bool,
    /// Append the pre-disqualification score column(s).
    pub unfiltered_score: bool,
}

impl Default for AnnotateCommand {
    fn default() -> Self {
        Self {
            k: 21,
            profile: GcProfile::Band40To60,
            gene_file: None,
            conservation_file: None,
            threshold: ConservationThreshold::DEFAULT_THRESHOLD,
            annotate_only: false,
            reverse: false,
            unfiltered_score: false,
        }
    }
}

impl AnnotateCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the rule battery from the configuration.
    fn build_rules(&self) -> Result<RuleSet> {
        let mut rules = RuleSet::standard(self.profile);

        if let Some(path) = &self.conservation_file {
            let table = Arc::new(ConservationTable::from_file(path)?);
            rules.push(ConservationAnnotation::new(table.clone()));
            if !self.annotate_only {
                rules.push(ConservationThreshold::new(table, self.threshold));
            }
        }

        if let Some(path) = &self.gene_file {
            let index = GeneIndex::from_file(path, self.k)?;
            // Annotation-only mode treats non-genic k-mers as passing.
            rules.push(GeneMembership::new(index, self.annotate_only));
        }

        Ok(rules)
    }

    fn write_header<W: Write>(&self, rules: &RuleSet, writer: &mut CsvWriter<W>) -> Result<()> {
        if self.reverse {
            writer.field("Kmer")?;
            writer.field("Rev")?;
            writer.field("Index")?;
            writer.field("Filter")?;
            for title in rules.titles() {
                writer.field(&format!("Fwd {}", title))?;
            }
            writer.field("Fwd Score")?;
            if self.unfiltered_score {
                writer.field("Fwd No Filt Score")?;
            }
            for title in rules.titles() {
                writer.field(&format!("Rev {}", title))?;
            }
            writer.field("Rev Score")?;
            if self.unfiltered_score {
                writer.field("Rev No Filt Score")?;
            }
        } else {
            writer.field("Kmer")?;
            writer.field("Index")?;
            writer.field("Filter")?;
            for title in rules.titles() {
                writer.field(title)?;
            }
            writer.field("Score")?;
            if self.unfiltered_score {
                writer.field("No Filt Score")?;
            }
        }
        writer.end_row()
    }

    pub fn run<R: Read, W: Write>(&self, input: R, out: &mut W) -> Result<u64> {
        let rules = self.build_rules()?;
        let mut writer = CsvWriter::new(out);
        self.write_header(&rules, &mut writer)?;

        let reader = BufReader::new(input);
        let mut rows = 0u64;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 2 {
                // Short rows are tolerated, same as short stream lines.
                continue;
            }

            let kmer = fields[0];
            let filter_pass = fields[1] == "1";
            let position: u64 = fields
                .get(2)
                .and_then(|f| f.parse().ok())
                .unwrap_or(0);

            writer.field(kmer)?;
            if self.reverse {
                writer.field(&reverse_complement(kmer))?;
            }
            writer.int_field(position)?;
            writer.field(if filter_pass { "T" } else { "F" })?;

            let fwd = rules.evaluate(kmer, position);
            let fwd_score = if filter_pass { fwd.score } else { 0.0 };
            for cell in &fwd.cells {
                writer.field(cell)?;
            }
            writer.float_field(fwd_score)?;
            if self.unfiltered_score {
                writer.float_field(fwd.raw_score)?;
            }

            if self.reverse {
                // The reverse strand is evaluated purely by the rules; the
                // filter flag describes the forward-strand sweep.
                let rev = rules.evaluate_reverse(kmer, position);
                for cell in &rev.cells {
                    writer.field(cell)?;
                }
                writer.float_field(rev.score)?;
                if self.unfiltered_score {
                    writer.float_field(rev.raw_score)?;
                }
            }

            writer.end_row()?;
            rows += 1;
        }

        writer.flush()?;
        log::info!("Annotated {} k-mers", rows);
        Ok(rows)
    }
}

/// Build a conservation table from reference sequences.
///
/// Each input file is one reference record; a k-mer's score is the
/// fraction of records containing it.
#[derive(Debug, Clone)]
pub struct ConservCommand {
    pub k: usize,
}

impl Default for ConservCommand {
    fn default() -> Self {
        Self { k: 21 }
    }
}

impl ConservCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<W: Write>(
        &self,
        source: &dyn KmerSource,
        inputs: &[PathBuf],
        out: &mut W,
    ) -> Result<u64> {
        let mut acc = ConservationAccumulator::new();

        for input in inputs {
            let stream = source.stream(self.k, std::slice::from_ref(input), false)?;
            let mut kmers = Vec::new();
            for record in stream {
                kmers.push(record?.kmer);
            }
            acc.add_record(kmers);
        }

        let records = acc.record_count();
        let mut writer = CsvWriter::new(out);
        writer.row(["#kmer", "score"])?;
        for (kmer, score) in acc.finish() {
            writer.field(&kmer)?;
            writer.float_field(score)?;
            writer.end_row()?;
        }
        writer.flush()?;

        log::info!("Wrote conservation scores over {} records", records);
        Ok(records)
    }
}
