//! Annotation rules and score aggregation.
//!
//! Each rule inspects one k-mer (and its stream position) and reports one of
//! three outcomes: a plain pass/fail, an additive score contribution, or a
//! labeled contribution with its own pass flag. A [`RuleSet`] runs the rules
//! in order, sums the contributions, and normalizes by the summed rule
//! ceilings; any failing rule forces the final score to zero.

use std::sync::Arc;

use crate::conservation::ConservationTable;
use crate::genes::GeneIndex;
use crate::kmer::{gc_fraction, is_au, is_gc, reverse_complement};

/// Result of a single rule check.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Neutral pass (`true`) or disqualifying failure (`false`).
    /// Never contributes to the score.
    Pass(bool),
    /// Additive score contribution. Never disqualifies.
    Score(f64),
    /// Diagnostic label plus contribution plus pass flag.
    Labeled {
        label: String,
        score: f64,
        pass: bool,
    },
}

/// A single annotation rule.
///
/// Rules are side-effect-free given their construction-time parameters;
/// evaluation order affects only the diagnostic column order.
pub trait AnnotationRule {
    /// Display label used as the output column header.
    fn title(&self) -> &str;

    /// Ceiling contribution of this rule; 0 for pure filters.
    fn max_score(&self) -> f64 {
        0.0
    }

    fn check(&self, kmer: &str, pos: u64) -> RuleOutcome;
}

/// GC-content acceptance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcProfile {
    /// 40%-60% inclusive.
    Band40To60,
    /// 30%-52% inclusive.
    Band30To52,
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// Fails k-mers ending in `GC` (a 3' GC clamp destabilizes the guide end).
#[derive(Debug, Default)]
pub struct EndGc;

impl AnnotationRule for EndGc {
    fn title(&self) -> &str {
        "No GC Clamp"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        RuleOutcome::Pass(!kmer.ends_with("GC"))
    }
}

/// Fails k-mers containing a dinucleotide repeated 3x consecutively.
#[derive(Debug, Default)]
pub struct DinucleotideRepeat;

impl AnnotationRule for DinucleotideRepeat {
    fn title(&self) -> &str {
        "No 3x Dinucleotide Repeats"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let b = kmer.as_bytes();
        let hit = (0..b.len().saturating_sub(5)).any(|i| {
            b[i] == b[i + 2] && b[i + 1] == b[i + 3] && b[i] == b[i + 4] && b[i + 1] == b[i + 5]
        });
        RuleOutcome::Pass(!hit)
    }
}

/// Fails k-mers containing a single base repeated 4x consecutively.
#[derive(Debug, Default)]
pub struct HomopolymerRun;

impl AnnotationRule for HomopolymerRun {
    fn title(&self) -> &str {
        "No 4x Homopolymer Repeats"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let hit = kmer
            .as_bytes()
            .windows(4)
            .any(|w| w[1] == w[0] && w[2] == w[0] && w[3] == w[0]);
        RuleOutcome::Pass(!hit)
    }
}

/// Fails k-mers sharing any 3-base window with their own reverse
/// complement; such k-mers can fold back on themselves.
#[derive(Debug, Default)]
pub struct SelfComplementary;

impl AnnotationRule for SelfComplementary {
    fn title(&self) -> &str {
        "Not Self-Complementary"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let rc = reverse_complement(kmer);
        let hit = kmer
            .as_bytes()
            .windows(3)
            .any(|w| std::str::from_utf8(w).map(|s| rc.contains(s)).unwrap_or(false));
        RuleOutcome::Pass(!hit)
    }
}

/// Fails k-mers whose GC fraction falls outside the configured band.
#[derive(Debug)]
pub struct GcBand {
    title: String,
    lo: f64,
    hi: f64,
}

impl GcBand {
    pub fn new(profile: GcProfile) -> Self {
        let (lo, hi) = match profile {
            GcProfile::Band40To60 => (0.40, 0.60),
            GcProfile::Band30To52 => (0.30, 0.52),
        };
        Self {
            title: format!("GC {:.0}-{:.0}%", lo * 100.0, hi * 100.0),
            lo,
            hi,
        }
    }
}

impl AnnotationRule for GcBand {
    fn title(&self) -> &str {
        &self.title
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let gc = gc_fraction(kmer);
        RuleOutcome::Pass(gc >= self.lo && gc <= self.hi)
    }
}

/// Neutral annotation: reports the GC fraction without affecting the score.
#[derive(Debug, Default)]
pub struct GcContent;

impl AnnotationRule for GcContent {
    fn title(&self) -> &str {
        "kmer GC Content"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        RuleOutcome::Labeled {
            label: format!("{}", gc_fraction(kmer)),
            score: 0.0,
            pass: true,
        }
    }
}

/// Restriction-site motifs in both DNA and RNA spellings.
const RESTRICTION_MOTIFS: &[&str] = &[
    "GGTACC", "GAATTC", "CTCGAG", "CATATG", "ACTAGT", "GGTAC", "GAATT", "GTACC", "TACC", "CTAGT",
    "GGUACC", "GAAUUC", "CUCGAG", "CAUAUG", "ACUAGU", "GGUAC", "GAAUU", "GUACC", "UACC", "CUAGU",
];

/// Fails k-mers containing any restriction-site motif.
#[derive(Debug, Default)]
pub struct RestrictionSites;

impl AnnotationRule for RestrictionSites {
    fn title(&self) -> &str {
        "No Restr Site"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let hit = RESTRICTION_MOTIFS.iter().any(|m| kmer.contains(m));
        RuleOutcome::Pass(!hit)
    }
}

/// Fails k-mers containing a run of 7 or more consecutive G/C bases.
#[derive(Debug, Default)]
pub struct GcRun;

impl AnnotationRule for GcRun {
    fn title(&self) -> &str {
        "No 7 GC Run"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let mut run = 0usize;
        for b in kmer.bytes() {
            if is_gc(b) {
                run += 1;
                if run >= 7 {
                    return RuleOutcome::Pass(false);
                }
            } else {
                run = 0;
            }
        }
        RuleOutcome::Pass(true)
    }
}

/// Fails k-mers starting with `AA`.
#[derive(Debug, Default)]
pub struct StartAa;

impl AnnotationRule for StartAa {
    fn title(&self) -> &str {
        "No Start AA"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        RuleOutcome::Pass(!kmer.starts_with("AA"))
    }
}

/// Fixed-weight bonus when the base at one 0-based offset is A/U.
#[derive(Debug)]
pub struct PositionAu {
    title: String,
    index: usize,
    weight: f64,
}

impl PositionAu {
    pub fn new(index: usize, weight: f64) -> Self {
        Self {
            title: format!("Pos {} A/U", index + 1),
            index,
            weight,
        }
    }

    /// Guide position 10 (offset 9), weight 0.05.
    pub fn pos10() -> Self {
        Self::new(9, 0.05)
    }

    /// Guide position 19 (offset 18), weight 0.15.
    pub fn pos19() -> Self {
        Self::new(18, 0.15)
    }
}

impl AnnotationRule for PositionAu {
    fn title(&self) -> &str {
        &self.title
    }

    fn max_score(&self) -> f64 {
        self.weight
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let hit = kmer
            .as_bytes()
            .get(self.index)
            .map(|&b| is_au(b))
            .unwrap_or(false);
        RuleOutcome::Score(if hit { self.weight } else { 0.0 })
    }
}

/// 0.50 bonus when positions 15-20 (1-based, inclusive) hold at least
/// three A/U bases.
#[derive(Debug, Default)]
pub struct AuWindowAtLeast;

impl AnnotationRule for AuWindowAtLeast {
    fn title(&self) -> &str {
        "Pos 15-20 3 A/U"
    }

    fn max_score(&self) -> f64 {
        0.50
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let b = kmer.as_bytes();
        let window = &b[b.len().min(14)..b.len().min(20)];
        let count = window.iter().filter(|&&c| is_au(c)).count();
        RuleOutcome::Score(if count >= 3 { 0.50 } else { 0.0 })
    }
}

/// 0.10 per A/U base in positions 17-19 (1-based, inclusive).
#[derive(Debug, Default)]
pub struct AuWindowCount;

impl AnnotationRule for AuWindowCount {
    fn title(&self) -> &str {
        "Pos 17-19 A/U Ct"
    }

    fn max_score(&self) -> f64 {
        0.30
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let b = kmer.as_bytes();
        let window = &b[b.len().min(16)..b.len().min(19)];
        let count = window.iter().filter(|&&c| is_au(c)).count();
        RuleOutcome::Score(count as f64 / 10.0)
    }
}

/// Neutral annotation: the k-mer's conservation score, 0 when absent.
#[derive(Debug)]
pub struct ConservationAnnotation {
    table: Arc<ConservationTable>,
}

impl ConservationAnnotation {
    pub fn new(table: Arc<ConservationTable>) -> Self {
        Self { table }
    }
}

impl AnnotationRule for ConservationAnnotation {
    fn title(&self) -> &str {
        "Conservation"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        let score = self.table.get(kmer).unwrap_or(0.0);
        RuleOutcome::Labeled {
            label: format!("{}", score),
            score: 0.0,
            pass: true,
        }
    }
}

/// Disqualifies k-mers whose conservation score does not strictly exceed
/// the threshold; absent k-mers fail.
#[derive(Debug)]
pub struct ConservationThreshold {
    table: Arc<ConservationTable>,
    threshold: f64,
}

impl ConservationThreshold {
    pub const DEFAULT_THRESHOLD: f64 = 0.9;

    pub fn new(table: Arc<ConservationTable>, threshold: f64) -> Self {
        Self { table, threshold }
    }
}

impl AnnotationRule for ConservationThreshold {
    fn title(&self) -> &str {
        "Cons Thresh"
    }

    fn check(&self, kmer: &str, _pos: u64) -> RuleOutcome {
        RuleOutcome::Pass(self.table.exceeds(kmer, self.threshold))
    }
}

/// Labels k-mers with the gene whose interval contains their position.
///
/// Non-genic positions report an empty label and the configured default
/// flag: `default_pass = false` turns the rule into a genic-only filter.
#[derive(Debug)]
pub struct GeneMembership {
    index: GeneIndex,
    default_pass: bool,
}

impl GeneMembership {
    pub fn new(index: GeneIndex, default_pass: bool) -> Self {
        Self {
            index,
            default_pass,
        }
    }
}

impl AnnotationRule for GeneMembership {
    fn title(&self) -> &str {
        "Gene"
    }

    fn check(&self, _kmer: &str, pos: u64) -> RuleOutcome {
        match self.index.find(pos) {
            Some(gene) => RuleOutcome::Labeled {
                label: gene.name.clone(),
                score: 0.0,
                pass: true,
            },
            None => RuleOutcome::Labeled {
                label: String::new(),
                score: 0.0,
                pass: self.default_pass,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregated result of running a rule set over one k-mer.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// One diagnostic cell per rule, in rule order.
    pub cells: Vec<String>,
    /// Normalized score ignoring disqualification, in `[0,1]`.
    pub raw_score: f64,
    /// Normalized score; exactly 0 when disqualified.
    pub score: f64,
    pub disqualified: bool,
}

/// An ordered battery of annotation rules with sum-then-normalize
/// aggregation.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn AnnotationRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard sequence-quality battery for the given GC profile.
    pub fn standard(profile: GcProfile) -> Self {
        let mut set = Self::new();
        set.push(EndGc);
        set.push(DinucleotideRepeat);
        set.push(HomopolymerRun);
        set.push(SelfComplementary);
        set.push(GcBand::new(profile));
        set.push(GcContent);
        set.push(RestrictionSites);
        set.push(GcRun);
        set.push(PositionAu::pos10());
        set.push(PositionAu::pos19());
        set.push(AuWindowAtLeast);
        set.push(AuWindowCount);
        set
    }

    /// Append a rule; evaluation order follows insertion order.
    pub fn push<R: AnnotationRule + 'static>(&mut self, rule: R) {
        self.rules.push(Box::new(rule));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule titles in evaluation order (output column headers).
    pub fn titles(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.title()).collect()
    }

    /// Sum of the rule ceilings; 1 when the sum is 0 so normalization
    /// never divides by zero.
    pub fn total_max_score(&self) -> f64 {
        let total: f64 = self.rules.iter().map(|r| r.max_score()).sum();
        if total == 0.0 {
            1.0
        } else {
            total
        }
    }

    /// Evaluate every rule against one k-mer.
    pub fn evaluate(&self, kmer: &str, pos: u64) -> Evaluation {
        let mut cells = Vec::with_capacity(self.rules.len());
        let mut score = 0.0;
        let mut disqualified = false;

        for rule in &self.rules {
            match rule.check(kmer, pos) {
                RuleOutcome::Pass(pass) => {
                    cells.push(if pass { "T" } else { "F" }.to_string());
                    if !pass {
                        disqualified = true;
                    }
                }
                RuleOutcome::Score(contribution) => {
                    cells.push(format!("{}", contribution));
                    score += contribution;
                }
                RuleOutcome::Labeled {
                    label,
                    score: contribution,
                    pass,
                } => {
                    cells.push(label);
                    score += contribution;
                    if !pass {
                        disqualified = true;
                    }
                }
            }
        }

        let raw_score = score / self.total_max_score();
        Evaluation {
            cells,
            raw_score,
            score: if disqualified { 0.0 } else { raw_score },
            disqualified,
        }
    }

    /// Evaluate the reverse complement of a k-mer. Shares no state with the
    /// forward evaluation.
    pub fn evaluate_reverse(&self, kmer: &str, pos: u64) -> Evaluation {
        self.evaluate(&reverse_complement(kmer), pos)
    }
}
