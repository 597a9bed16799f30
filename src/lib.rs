//! KARST: K-mer Annotation, Restriction & Scoring Toolkit
//!
//! This library filters and scores fixed-length k-mers for RNAi target
//! selection.
//!
//! # Features
//!
//! - **Streaming filter sweep**: intersects two sorted k-mer streams into a
//!   sub-k-mer filter set and flags full k-mers containing any member
//! - **Annotation engine**: an ordered battery of sequence-quality rules
//!   producing a normalized effectiveness score per k-mer
//! - **Lookup refinement**: gene-interval membership and conservation-score
//!   tables feed the rule battery
//!
//! # Example
//!
//! ```rust
//! use karst_genomics::rules::{GcProfile, RuleSet};
//!
//! let rules = RuleSet::standard(GcProfile::Band40To60);
//! let eval = rules.evaluate("CCACCAACCAACCCAACAACC", 0);
//! assert!(!eval.disqualified);
//! ```

pub mod conservation;
pub mod counts;
pub mod engine;
pub mod filter;
pub mod genes;
pub mod intersect;
pub mod kmer;
pub mod output;
pub mod pipeline;
pub mod rules;

// Re-export commonly used types
pub use counts::{KmerCount, KmerCountReader, StreamError};
pub use filter::FilterSet;
pub use genes::{GeneIndex, GeneInterval};
pub use pipeline::{AnnotateCommand, ConservCommand, KfilterCommand};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::conservation::ConservationTable;
    pub use crate::counts::{KmerCount, KmerCountReader, StreamError};
    pub use crate::engine::{ExternalEngine, KmerSource, VecSource};
    pub use crate::filter::FilterSet;
    pub use crate::genes::{GeneIndex, GeneInterval};
    pub use crate::pipeline::{AnnotateCommand, ConservCommand, KfilterCommand};
    pub use crate::rules::{AnnotationRule, GcProfile, RuleOutcome, RuleSet};
}
