use std::fmt::{self, Display};

use nonempty::NonEmpty;

use crate::ProcessorId;

/// The set of logical processors that make up one physical core.
///
/// A thread pinned to an affinity mask may only be scheduled on the logical processors in the
/// mask. All logical processors of one physical core share the L1 and L2 caches, so threads
/// pinned to the same mask can cooperate on a shared data set without the data leaving the core.
///
/// The mask is immutable and never empty. Processor IDs are kept sorted and de-duplicated.
///
/// # Example
///
/// ```
/// use core_topology::AffinityMask;
///
/// let mask = AffinityMask::from_processors([5, 1]).unwrap();
///
/// assert_eq!(mask.processors().collect::<Vec<_>>(), vec![1, 5]);
/// assert!(mask.contains(5));
/// assert!(!mask.contains(2));
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AffinityMask {
    processors: NonEmpty<ProcessorId>,
}

impl AffinityMask {
    /// Creates a mask from a collection of processor IDs.
    ///
    /// Returns `None` if the collection is empty.
    #[must_use]
    pub fn from_processors(processors: impl IntoIterator<Item = ProcessorId>) -> Option<Self> {
        let mut processors = processors.into_iter().collect::<Vec<_>>();
        processors.sort_unstable();
        processors.dedup();

        NonEmpty::from_vec(processors).map(|processors| Self { processors })
    }

    /// Creates a mask that contains exactly one logical processor.
    #[must_use]
    pub fn single(processor: ProcessorId) -> Self {
        Self {
            processors: NonEmpty::singleton(processor),
        }
    }

    /// Iterates over the logical processors in the mask in ascending order.
    pub fn processors(&self) -> impl Iterator<Item = ProcessorId> + '_ {
        self.processors.iter().copied()
    }

    /// The lowest numbered logical processor in the mask.
    #[must_use]
    pub fn first(&self) -> ProcessorId {
        *self.processors.first()
    }

    /// Number of logical processors in the mask. Always at least 1.
    #[must_use]
    #[expect(
        clippy::len_without_is_empty,
        reason = "an affinity mask is never empty"
    )]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the mask includes the given logical processor.
    #[must_use]
    pub fn contains(&self, processor: ProcessorId) -> bool {
        self.processors.iter().any(|p| *p == processor)
    }

    /// Whether the two masks have at least one logical processor in common.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.processors().any(|p| other.contains(p))
    }
}

impl Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cpulist::emit(self.processors()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(AffinityMask::from_processors([]).is_none());
    }

    #[test]
    fn processors_are_sorted_and_deduplicated() {
        let mask = AffinityMask::from_processors([9, 1, 9, 4]).unwrap();

        assert_eq!(mask.processors().collect::<Vec<_>>(), vec![1, 4, 9]);
        assert_eq!(mask.len(), 3);
        assert_eq!(mask.first(), 1);
    }

    #[test]
    fn single_contains_only_itself() {
        let mask = AffinityMask::single(7);

        assert_eq!(mask.len(), 1);
        assert!(mask.contains(7));
        assert!(!mask.contains(6));
    }

    #[test]
    fn overlap_detection() {
        let a = AffinityMask::from_processors([0, 8]).unwrap();
        let b = AffinityMask::from_processors([1, 9]).unwrap();
        let c = AffinityMask::from_processors([8, 16]).unwrap();

        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn display_is_parseable_cpulist() {
        let mask = AffinityMask::from_processors([0, 1, 2, 3, 8]).unwrap();

        let parsed = cpulist::parse(&mask.to_string()).unwrap();
        assert_eq!(parsed, mask.processors().collect::<Vec<_>>());
    }

    #[test]
    fn equality_ignores_input_order() {
        let a = AffinityMask::from_processors([3, 1]).unwrap();
        let b = AffinityMask::from_processors([1, 3]).unwrap();

        assert_eq!(a, b);
    }
}
