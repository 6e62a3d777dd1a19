use std::fmt;

/// One unit of work inside a [`Job`], executed by exactly one thread of a core group.
pub type Slot = Box<dyn FnOnce() + Send + 'static>;

/// A group of slots that execute concurrently on the logical processors of one physical core.
///
/// Slot `i` always executes on thread `i` of the core group that picks up the job. Slot 0 runs on
/// the thread that dequeued the job, the others on the core's worker threads. The number of slots
/// must equal the [`threads_per_core()`][crate::ThreadPool::threads_per_core] of the pool the job
/// is submitted to.
///
/// # Example
///
/// ```
/// use core_local::Job;
///
/// let job = Job::from_fn(2, |slot_index| {
///     move || println!("hello from slot {slot_index}")
/// });
///
/// assert_eq!(job.len(), 2);
/// ```
pub struct Job {
    slots: Vec<Slot>,
}

impl Job {
    /// Creates a job from a list of slots, in slot index order.
    #[must_use]
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    /// Creates a job with `slot_count` slots, calling `factory` with each slot index to create
    /// the slot's callable.
    #[must_use]
    pub fn from_fn<F, S>(slot_count: usize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> S,
        S: FnOnce() + Send + 'static,
    {
        Self {
            slots: (0..slot_count)
                .map(|slot_index| Box::new(factory(slot_index)) as Slot)
                .collect(),
        }
    }

    /// Number of slots in the job.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the job has no slots. Such a job is never accepted by a pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}

impl FromIterator<Slot> for Job {
    fn from_iter<T: IntoIterator<Item = Slot>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Job: Send);

    #[test]
    fn from_fn_passes_slot_index() {
        let sum = Arc::new(AtomicUsize::new(0));

        let job = Job::from_fn(4, |slot_index| {
            let sum = Arc::clone(&sum);
            move || {
                sum.fetch_add(slot_index, Ordering::Relaxed);
            }
        });

        assert_eq!(job.len(), 4);

        for slot in job.into_slots() {
            slot();
        }

        assert_eq!(sum.load(Ordering::Relaxed), 1 + 2 + 3);
    }

    #[test]
    fn empty_job() {
        let job = Job::new(Vec::new());

        assert!(job.is_empty());
        assert_eq!(job.len(), 0);
    }

    #[test]
    fn collect_from_slots() {
        let job: Job = (0..3).map(|_| Box::new(|| {}) as Slot).collect();

        assert_eq!(job.len(), 3);
    }
}
