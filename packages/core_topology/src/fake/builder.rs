use std::num::NonZero;

use nonempty::NonEmpty;

use crate::{AffinityMask, ProcessorId};

/// How logical processor IDs are distributed over the simulated physical cores.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SiblingLayout {
    /// Core `i` owns processors `i * threads .. (i + 1) * threads` (typical on Windows).
    Contiguous,

    /// Core `i` owns processors `i, i + cores, i + 2 * cores, ...` (typical on Linux/x86).
    Interleaved,
}

/// Describes a simulated processor topology.
///
/// # Example
///
/// ```
/// use core_topology::Topology;
/// use core_topology::fake::FakeTopologyBuilder;
/// use new_zealand::nz;
///
/// let topology = Topology::fake(
///     FakeTopologyBuilder::from_counts(nz!(2), nz!(2)).interleaved_siblings(),
/// );
///
/// let core0 = topology.affinity_mask_for(0).unwrap();
/// assert_eq!(core0.processors().collect::<Vec<_>>(), vec![0, 2]);
/// ```
#[derive(Clone, Debug)]
pub struct FakeTopologyBuilder {
    cores: NonZero<usize>,
    threads_per_core: NonZero<usize>,
    layout: SiblingLayout,
    failing_queries: usize,
    failing_pin: Option<usize>,
}

impl FakeTopologyBuilder {
    /// A topology with `cores` physical cores, each exposing `threads_per_core` logical
    /// processors.
    #[must_use]
    pub fn from_counts(cores: NonZero<usize>, threads_per_core: NonZero<usize>) -> Self {
        Self {
            cores,
            threads_per_core,
            layout: SiblingLayout::Contiguous,
            failing_queries: 0,
            failing_pin: None,
        }
    }

    /// Numbers the logical processors the way Linux on x86 does: the first hyperthread of every
    /// core comes first, then the second hyperthread of every core, and so on.
    #[must_use]
    pub fn interleaved_siblings(mut self) -> Self {
        self.layout = SiblingLayout::Interleaved;
        self
    }

    /// Makes the first `count` topology queries fail, as if the operating system was
    /// temporarily unable to answer.
    #[must_use]
    pub fn failing_queries(mut self, count: usize) -> Self {
        self.failing_queries = count;
        self
    }

    /// Makes the pin call with the given zero-based index fail, counting the calls made on any
    /// thread. Every other pin call succeeds.
    #[must_use]
    pub fn failing_pin(mut self, call_index: usize) -> Self {
        self.failing_pin = Some(call_index);
        self
    }

    pub(crate) fn initial_failures(&self) -> usize {
        self.failing_queries
    }

    pub(crate) fn failing_pin_index(&self) -> Option<usize> {
        self.failing_pin
    }

    pub(crate) fn core_masks(&self) -> NonEmpty<AffinityMask> {
        let cores = self.cores.get();
        let threads = self.threads_per_core.get();

        let masks = (0..cores)
            .map(|core| {
                let processors = (0..threads).map(|thread| {
                    let id = match self.layout {
                        SiblingLayout::Contiguous => core
                            .checked_mul(threads)
                            .and_then(|base| base.checked_add(thread)),
                        SiblingLayout::Interleaved => thread
                            .checked_mul(cores)
                            .and_then(|base| base.checked_add(core)),
                    };

                    id.and_then(|id| ProcessorId::try_from(id).ok())
                        .expect("fake topology must fit into the processor ID range")
                });

                AffinityMask::from_processors(processors)
                    .expect("threads_per_core is non-zero so every core has a processor")
            })
            .collect::<Vec<_>>();

        NonEmpty::from_vec(masks).expect("core count is non-zero")
    }
}
