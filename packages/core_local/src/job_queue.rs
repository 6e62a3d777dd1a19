use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::Job;

/// First-in-first-out queue of jobs waiting for a core to pick them up.
///
/// Knows nothing about scheduling, it only keeps the jobs in order.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    pub(crate) fn try_pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    /// Instantaneous length. Advisory only, it may be stale by the time the caller looks at it.
    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(JobQueue: Send, Sync);

    #[test]
    fn empty_queue_pops_nothing() {
        let queue = JobQueue::new();

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn jobs_come_out_in_push_order() {
        let queue = JobQueue::new();

        for slot_count in 1..=3 {
            queue.push(Job::from_fn(slot_count, |_| || {}));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop().unwrap().len(), 1);
        assert_eq!(queue.try_pop().unwrap().len(), 2);
        assert_eq!(queue.try_pop().unwrap().len(), 3);
        assert!(queue.try_pop().is_none());
    }

    #[cfg_attr(miri, ignore)] // Slow under Miri.
    #[test]
    fn concurrent_push_and_pop_loses_nothing() {
        const PER_THREAD: usize = 250;

        let queue = JobQueue::new();

        let popped = thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..PER_THREAD {
                        queue.push(Job::from_fn(1, |_| || {}));
                    }
                });
            }

            let popper = s.spawn(|| {
                let mut popped = 0;
                while popped < PER_THREAD * 4 {
                    if queue.try_pop().is_some() {
                        popped += 1;
                    } else {
                        thread::yield_now();
                    }
                }
                popped
            });

            popper.join().unwrap()
        });

        assert_eq!(popped, PER_THREAD * 4);
        assert!(queue.is_empty());
    }
}
