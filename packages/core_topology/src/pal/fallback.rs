use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::thread;

use nonempty::NonEmpty;

use crate::error::Result;
use crate::pal::Platform;
use crate::{AffinityMask, ProcessorId, TopologyError};

thread_local! {
    /// The mask the current thread was "pinned" to. Nothing is applied at the OS level, we only
    /// remember the request so the affinity can be reported back consistently.
    static PINNED_MASK: RefCell<Option<AffinityMask>> = const { RefCell::new(None) };
}

/// Fallback platform for operating systems without native topology support.
///
/// Every logical processor reported by `available_parallelism()` is treated as its own physical
/// core because SMT siblings cannot be identified. Pinning is simulated: the request is recorded
/// for the current thread but the OS scheduler is left unconstrained.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

impl BuildTargetPlatform {
    #[expect(clippy::unused_self, reason = "matches Platform trait signature")]
    fn all_processors(&self) -> Result<AffinityMask> {
        let count = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .map_err(|e| TopologyError::query_failed(format!("cannot count processors: {e}")))?;

        let count = ProcessorId::try_from(count)
            .map_err(|_| TopologyError::query_failed("processor count does not fit into u32"))?;

        AffinityMask::from_processors(0..count)
            .ok_or_else(|| TopologyError::query_failed("the system reported no processors"))
    }
}

impl Platform for BuildTargetPlatform {
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>> {
        let all = self.all_processors()?;

        let cores = all.processors().map(AffinityMask::single).collect::<Vec<_>>();

        Ok(NonEmpty::from_vec(cores).expect("an affinity mask is never empty"))
    }

    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        PINNED_MASK.with_borrow_mut(|pinned| *pinned = Some(mask.clone()));
        Ok(())
    }

    fn current_thread_affinity(&self) -> Result<AffinityMask> {
        match PINNED_MASK.with_borrow(Clone::clone) {
            Some(mask) => Ok(mask),
            None => self.all_processors(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn every_processor_is_its_own_core() {
        let cores = BUILD_TARGET_PLATFORM.core_masks().unwrap();

        for (index, core) in cores.iter().enumerate() {
            assert_eq!(core.len(), 1);
            assert_eq!(core.first() as usize, index);
        }
    }

    #[cfg_attr(miri, ignore)] // Miri cannot spawn threads with the needed isolation guarantees.
    #[test]
    fn pinning_is_remembered_per_thread() {
        thread::spawn(|| {
            let all = BUILD_TARGET_PLATFORM.current_thread_affinity().unwrap();
            let cores = BUILD_TARGET_PLATFORM.core_masks().unwrap();
            assert_eq!(all.len(), cores.len());

            let target = cores.last().clone();
            BUILD_TARGET_PLATFORM.pin_current_thread_to(&target).unwrap();

            assert_eq!(BUILD_TARGET_PLATFORM.current_thread_affinity().unwrap(), target);
        })
        .join()
        .unwrap();
    }
}
