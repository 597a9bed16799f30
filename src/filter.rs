//! Sub-k-mer filter set and the sliding-window disqualification check.

use rustc_hash::FxHashSet;

use crate::counts::{KmerCountReader, Result};
use crate::intersect::intersect_sorted;

/// A read-only set of sub-k-mers used to disqualify full-length k-mers.
///
/// Built once per run, queried for every full k-mer afterwards.
#[derive(Debug, Default)]
pub struct FilterSet {
    members: FxHashSet<String>,
    sub_k: usize,
}

impl FilterSet {
    /// Build from an already-computed member set.
    pub fn new(members: FxHashSet<String>, sub_k: usize) -> Self {
        Self { members, sub_k }
    }

    /// Build by intersecting two lexicographically sorted k-mer streams:
    /// the sub-k-mers of the target sequence and the unwanted-k-mer file.
    pub fn from_sorted_streams<A, B>(target: A, unwanted: B, sub_k: usize) -> Self
    where
        A: IntoIterator<Item = String>,
        B: IntoIterator<Item = String>,
    {
        Self::new(intersect_sorted(target, unwanted), sub_k)
    }

    /// Build from two sorted count-stream readers, the same merge as
    /// [`intersect_sorted`] but with read errors surfaced instead of
    /// truncating the streams.
    pub fn from_sorted_readers<R1, R2>(
        mut target: KmerCountReader<R1>,
        mut unwanted: KmerCountReader<R2>,
        sub_k: usize,
    ) -> Result<Self>
    where
        R1: std::io::Read,
        R2: std::io::Read,
    {
        let mut members = FxHashSet::default();
        let mut a = target.read_record()?;
        let mut b = unwanted.read_record()?;

        while let (Some(ra), Some(rb)) = (a.as_ref(), b.as_ref()) {
            match ra.kmer.cmp(&rb.kmer) {
                std::cmp::Ordering::Equal => {
                    members.insert(a.take().unwrap().kmer);
                    a = target.read_record()?;
                    b = unwanted.read_record()?;
                }
                std::cmp::Ordering::Less => {
                    a = target.read_record()?;
                }
                std::cmp::Ordering::Greater => {
                    b = unwanted.read_record()?;
                }
            }
        }

        Ok(Self::new(members, sub_k))
    }

    /// Number of sub-k-mers in the set.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if no sub-k-mer was loaded; every k-mer then passes.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sub-k-mer length this set was built for.
    #[inline]
    pub fn sub_k(&self) -> usize {
        self.sub_k
    }

    /// Direct membership test for a single sub-k-mer.
    #[inline]
    pub fn contains(&self, sub_kmer: &str) -> bool {
        self.members.contains(sub_kmer)
    }

    /// Check a full k-mer against the set: slide a `sub_k`-wide window over
    /// every offset and fail on the first member hit. A k-mer shorter than
    /// `sub_k` has no windows and passes.
    pub fn passes(&self, kmer: &str) -> bool {
        if self.members.is_empty() || kmer.len() < self.sub_k {
            return true;
        }

        for start in 0..=(kmer.len() - self.sub_k) {
            if self.members.contains(&kmer[start..start + self.sub_k]) {
                return false;
            }
        }
        true
    }
}
