use thiserror::Error;

/// A job was rejected by [`ThreadPool::add()`][crate::ThreadPool::add]. The job was not queued.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum SubmitError {
    /// Every job must have exactly one slot per thread of a core group.
    #[error("job has {actual} slots but the pool runs {expected} threads per core")]
    SlotCountMismatch {
        /// The number of threads per core in the pool.
        expected: usize,

        /// The number of slots in the rejected job.
        actual: usize,
    },

    /// The pool has been closed and no longer accepts jobs.
    #[error("the thread pool has been closed")]
    Closed,
}

/// The job behind a [`JobHandle`][crate::JobHandle] will never run because the pool was closed
/// without finishing the queue.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("the job was abandoned before it could run because the thread pool was closed")]
#[non_exhaustive]
pub struct JobAbandoned;
