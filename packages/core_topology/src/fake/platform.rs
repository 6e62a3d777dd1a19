use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use foldhash::HashMap;
use nonempty::NonEmpty;
use parking_lot::Mutex;

use crate::error::Result;
use crate::fake::FakeTopologyBuilder;
use crate::pal::Platform;
use crate::{AffinityMask, TopologyError};

/// Platform backed by a [`FakeTopologyBuilder`] description instead of the operating system.
#[derive(Debug)]
pub(crate) struct FakePlatform {
    cores: NonEmpty<AffinityMask>,

    /// How many more `core_masks()` calls fail before the topology becomes visible.
    remaining_failures: AtomicUsize,

    failing_pin: Option<usize>,
    pin_calls: AtomicUsize,

    /// Masks requested via `pin_current_thread_to()`, per thread.
    pinned: Mutex<HashMap<ThreadId, AffinityMask>>,
}

impl FakePlatform {
    pub(crate) fn from_builder(builder: &FakeTopologyBuilder) -> Self {
        Self {
            cores: builder.core_masks(),
            remaining_failures: AtomicUsize::new(builder.initial_failures()),
            failing_pin: builder.failing_pin_index(),
            pin_calls: AtomicUsize::new(0),
            pinned: Mutex::new(HashMap::default()),
        }
    }

    fn all_processors(&self) -> AffinityMask {
        AffinityMask::from_processors(self.cores.iter().flat_map(AffinityMask::processors))
            .expect("fake topology has at least one processor")
    }
}

impl Platform for FakePlatform {
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>> {
        // Relaxed is enough, the counter does not guard any other memory.
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

        if failed {
            return Err(TopologyError::query_failed("simulated topology query failure"));
        }

        Ok(self.cores.clone())
    }

    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        let call_index = self.pin_calls.fetch_add(1, Ordering::Relaxed);

        if self.failing_pin == Some(call_index) {
            return Err(TopologyError::PinFailed {
                mask: mask.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "simulated pin failure"),
            });
        }

        self.pinned.lock().insert(thread::current().id(), mask.clone());
        Ok(())
    }

    fn current_thread_affinity(&self) -> Result<AffinityMask> {
        Ok(self
            .pinned
            .lock()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_else(|| self.all_processors()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn failures_are_consumed_then_succeed() {
        let builder = FakeTopologyBuilder::from_counts(nz!(2), nz!(1)).failing_queries(2);
        let platform = FakePlatform::from_builder(&builder);

        assert!(platform.core_masks().is_err());
        assert!(platform.core_masks().is_err());
        assert_eq!(platform.core_masks().unwrap().len(), 2);
        assert_eq!(platform.core_masks().unwrap().len(), 2);
    }

    #[test]
    fn unpinned_thread_sees_every_processor() {
        let platform =
            FakePlatform::from_builder(&FakeTopologyBuilder::from_counts(nz!(2), nz!(2)));

        let affinity = platform.current_thread_affinity().unwrap();

        assert_eq!(affinity.processors().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[cfg_attr(miri, ignore)] // Slow and adds nothing under Miri.
    #[test]
    fn pinning_is_tracked_per_thread() {
        let platform =
            FakePlatform::from_builder(&FakeTopologyBuilder::from_counts(nz!(2), nz!(2)));
        let core1 = platform.core_masks().unwrap()[1].clone();

        thread::scope(|s| {
            s.spawn(|| {
                platform.pin_current_thread_to(&core1).unwrap();
                assert_eq!(platform.current_thread_affinity().unwrap(), core1);
            });
        });

        // The pinning of the other thread does not leak to this one.
        assert_eq!(platform.current_thread_affinity().unwrap().len(), 4);
    }

    #[test]
    fn only_the_chosen_pin_call_fails() {
        let builder = FakeTopologyBuilder::from_counts(nz!(2), nz!(2)).failing_pin(1);
        let platform = FakePlatform::from_builder(&builder);
        let core0 = platform.core_masks().unwrap()[0].clone();
        let core1 = platform.core_masks().unwrap()[1].clone();

        platform.pin_current_thread_to(&core0).unwrap();

        let error = platform.pin_current_thread_to(&core1).unwrap_err();
        assert!(matches!(error, TopologyError::PinFailed { ref mask, .. } if *mask == core1));

        // The failed call left the earlier pinning in place.
        assert_eq!(platform.current_thread_affinity().unwrap(), core0);

        platform.pin_current_thread_to(&core1).unwrap();
        assert_eq!(platform.current_thread_affinity().unwrap(), core1);
    }
}
