use std::io;

use thiserror::Error;

use crate::{AffinityMask, CoreIndex};

/// Errors that can occur when querying the processor topology or applying it to threads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TopologyError {
    /// The caller asked for a physical core that does not exist on this system.
    #[error("physical core {index} does not exist: the system has {core_count} physical cores")]
    CoreIndexOutOfRange {
        /// The index that was requested.
        index: CoreIndex,

        /// The number of physical cores the system actually has.
        core_count: usize,
    },

    /// The operating system did not answer the topology query or answered it with data we
    /// could not make sense of.
    #[error("processor topology query failed: {reason}")]
    QueryFailed {
        /// A human-readable description of the problem.
        reason: String,
    },

    /// The operating system refused to restrict the current thread to the given processors.
    #[error("failed to pin the current thread to processors {mask}")]
    PinFailed {
        /// The processors the thread was supposed to be pinned to.
        mask: AffinityMask,

        /// The underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl TopologyError {
    pub(crate) fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for topology operations, returning the crate's
/// [`TopologyError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, TopologyError>;
