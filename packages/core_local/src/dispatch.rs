//! Pool-wide job hand-off between submitters and core handlers.

use parking_lot::{Condvar, Mutex};

use crate::{Job, JobQueue, SubmitError};

#[derive(Debug, Default)]
struct ShutdownFlags {
    terminate: bool,

    /// Keep handing out queued jobs after `terminate` is set, until the queue is empty.
    finish_queue: bool,
}

/// Owns the job queue and the shutdown flags, guarded by the dispatch lock.
///
/// Lock order is always dispatch lock before the queue lock.
#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    flags: Mutex<ShutdownFlags>,
    job_available: Condvar,
    queue: JobQueue,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a job and wakes one idle core handler.
    ///
    /// The push happens under the dispatch lock, so a handler that has just seen an empty queue
    /// is guaranteed to be waiting on the condition variable by the time we notify it.
    pub(crate) fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let flags = self.flags.lock();

        if flags.terminate {
            return Err(SubmitError::Closed);
        }

        self.queue.push(job);
        drop(flags);

        self.job_available.notify_one();
        Ok(())
    }

    /// Blocks until there is a job to process or the pool is shutting down.
    ///
    /// Returns `None` when the calling handler should stop.
    pub(crate) fn next_job(&self) -> Option<Job> {
        let mut flags = self.flags.lock();

        loop {
            if flags.terminate && !(flags.finish_queue && !self.queue.is_empty()) {
                return None;
            }

            if let Some(job) = self.queue.try_pop() {
                return Some(job);
            }

            self.job_available.wait(&mut flags);
        }
    }

    /// Tells every core handler to stop. Returns `false` if shutdown had already been requested,
    /// in which case the earlier `finish_queue` choice stays in effect.
    pub(crate) fn shut_down(&self, finish_queue: bool) -> bool {
        let mut flags = self.flags.lock();

        if flags.terminate {
            return false;
        }

        flags.terminate = true;
        flags.finish_queue = finish_queue;
        drop(flags);

        self.job_available.notify_all();
        true
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.flags.lock().terminate
    }

    /// Removes every job that is still queued. Only meaningful after shutdown, when no handler is
    /// going to pick them up anymore.
    pub(crate) fn take_queued(&self) -> Vec<Job> {
        let _flags = self.flags.lock();

        std::iter::from_fn(|| self.queue.try_pop()).collect()
    }

    pub(crate) fn queued_jobs(&self) -> usize {
        self.queue.len()
    }
}
