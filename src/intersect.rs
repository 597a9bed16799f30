//! Sorted-stream intersection.
//!
//! Both the engine's sorted count output and the filter-set file are
//! lexicographically sorted by sequence, so the common members can be
//! collected in a single merge pass without materializing either side.

use rustc_hash::FxHashSet;

/// Intersect two lexicographically sorted k-mer streams.
///
/// Each input must be monotonically non-decreasing; that ordering is a
/// caller precondition (the counting engine sorts its output in count mode)
/// and is not re-checked here. Duplicates collapse into the result set.
/// Either stream ending first ends the merge; an empty input yields an
/// empty set.
pub fn intersect_sorted<A, B>(a: A, b: B) -> FxHashSet<String>
where
    A: IntoIterator<Item = String>,
    B: IntoIterator<Item = String>,
{
    let mut result = FxHashSet::default();
    let mut a = a.into_iter();
    let mut b = b.into_iter();

    let mut cur_a = a.next();
    let mut cur_b = b.next();

    while let (Some(ka), Some(kb)) = (cur_a.as_ref(), cur_b.as_ref()) {
        match ka.cmp(kb) {
            std::cmp::Ordering::Equal => {
                result.insert(cur_a.take().unwrap());
                cur_a = a.next();
                cur_b = b.next();
            }
            std::cmp::Ordering::Less => {
                cur_a = a.next();
            }
            std::cmp::Ordering::Greater => {
                cur_b = b.next();
            }
        }
    }

    result
}
