//! Pool construction, submission and shutdown.

use std::any::type_name;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_topology::{AffinityMask, Topology, TopologyError};
use parking_lot::Mutex;
use tracing::debug;

use crate::job_handle::SlotResult;
use crate::{CoreHandler, Dispatcher, Job, JobHandle, Slot, SubmitError};

const DEFAULT_THREAD_NAME_PREFIX: &str = "core_local";

/// A thread pool that runs each job on the logical processors of a single physical core.
///
/// The pool has one core group per physical core it uses. A core group is one handler thread plus
/// `threads_per_core - 1` worker threads, all pinned to the same physical core. Each job has one
/// slot per thread of a core group and all slots of a job run concurrently on the same core, so
/// they share that core's L1 and L2 caches. Jobs are taken from a single queue in submission order
/// by whichever core group is idle. A core group never starts a job before every slot of its
/// previous job has finished.
///
/// # Lifetime
///
/// [`close()`][Self::close] stops the pool and waits for its threads to exit. Dropping the pool
/// without closing it first is the same as `close(true)`: every queued job still runs.
///
/// # Panics
///
/// The pool makes no promises about slots that panic. A panic in a slot submitted via
/// [`add()`][Self::add] is logged and discarded, and the thread carries on with the next job.
/// Slots submitted via [`add_with_results()`][Self::add_with_results] hand their panic to the
/// [`JobHandle`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use core_local::{Job, ThreadPool};
///
/// let pool = ThreadPool::new();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// pool.add(Job::from_fn(pool.threads_per_core().get(), |_| {
///     let counter = Arc::clone(&counter);
///     move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }
/// }))
/// .unwrap();
///
/// pool.close(true);
///
/// assert_eq!(counter.load(Ordering::Relaxed), pool.threads_per_core().get());
/// ```
pub struct ThreadPool {
    dispatcher: Arc<Dispatcher>,
    handler_threads: Mutex<Vec<JoinHandle<()>>>,
    affinity_masks: Box<[AffinityMask]>,
    threads_per_core: NonZero<usize>,
    physical_core_count: usize,
}

impl ThreadPool {
    /// Creates a pool that uses every physical core, with as many threads per core as the cores
    /// have logical processors.
    ///
    /// Use [`ThreadPool::builder()`] for custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the processor topology cannot be determined or the threads cannot be pinned.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the pool.
    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Queues a job for execution on the next idle core group.
    ///
    /// # Errors
    ///
    /// Rejects the job without queueing it if its slot count differs from
    /// [`threads_per_core()`][Self::threads_per_core] or if the pool has been closed.
    pub fn add(&self, job: Job) -> Result<(), SubmitError> {
        if job.len() != self.threads_per_core.get() {
            return Err(SubmitError::SlotCountMismatch {
                expected: self.threads_per_core.get(),
                actual: job.len(),
            });
        }

        self.dispatcher.submit(job)
    }

    /// Queues a job whose slots return values, returning a handle to collect them.
    ///
    /// # Errors
    ///
    /// Same as [`add()`][Self::add].
    ///
    /// # Example
    ///
    /// ```
    /// use core_local::ThreadPool;
    ///
    /// let pool = ThreadPool::new();
    /// let threads = pool.threads_per_core().get();
    ///
    /// let handle = pool
    ///     .add_with_results((0..threads).map(|slot_index| move || slot_index * 2))
    ///     .unwrap();
    ///
    /// let results = handle.join().unwrap();
    /// assert_eq!(results, (0..threads).map(|i| i * 2).collect::<Vec<_>>());
    /// ```
    pub fn add_with_results<I, F, R>(&self, slots: I) -> Result<JobHandle<R>, SubmitError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (slots, receivers): (Vec<Slot>, Vec<_>) = slots
            .into_iter()
            .map(|f| {
                let (tx, rx) = oneshot::channel::<SlotResult<R>>();

                let slot: Slot = Box::new(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(f));
                    // If the handle is gone, nobody wants the result.
                    drop(tx.send(result));
                });

                (slot, rx)
            })
            .unzip();

        self.add(Job::new(slots))?;

        Ok(JobHandle::new(receivers))
    }

    /// Stops the pool and blocks until all its threads have exited.
    ///
    /// With `finish_queue` set, every queued job runs before the threads exit. Without it, each
    /// core group finishes only the job it is currently running and the remaining queued jobs are
    /// dropped; their [`JobHandle`]s report [`JobAbandoned`][crate::JobAbandoned].
    ///
    /// Calling `close()` more than once is harmless. Only the first call decides `finish_queue`.
    #[cfg_attr(test, mutants::skip)] // Mutations here mostly just hang the test.
    pub fn close(&self, finish_queue: bool) {
        if self.dispatcher.shut_down(finish_queue) {
            debug!(finish_queue, "closing thread pool");
        }

        // Holding the lock while joining makes a concurrent second `close()` wait for the first.
        let mut handler_threads = self.handler_threads.lock();

        for handle in mem::take(&mut *handler_threads) {
            if let Err(payload) = handle.join() {
                // Slots run inside a panic trap, so a handler panic means the pool is broken.
                panic::resume_unwind(payload);
            }
        }

        let abandoned = self.dispatcher.take_queued();

        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "dropping jobs that never started");
        }
    }

    /// Whether [`close()`][Self::close] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_shut_down()
    }

    /// Number of jobs waiting in the queue. The value may be stale by the time it is returned.
    #[must_use]
    pub fn queued_jobs(&self) -> usize {
        self.dispatcher.queued_jobs()
    }

    /// Number of physical cores in the system, as seen when the pool was created.
    #[must_use]
    pub fn physical_core_count(&self) -> usize {
        self.physical_core_count
    }

    /// Number of physical cores the pool runs jobs on (one core group per core).
    #[must_use]
    pub fn core_count(&self) -> usize {
        self.affinity_masks.len()
    }

    /// Number of threads in each core group, which is also the number of slots every job must
    /// have.
    #[must_use]
    pub fn threads_per_core(&self) -> NonZero<usize> {
        self.threads_per_core
    }

    /// The logical processors of each core group, indexed by core index.
    #[must_use]
    pub fn affinity_masks(&self) -> &[AffinityMask] {
        &self.affinity_masks
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if thread::panicking() {
            // Joining could block forever if a slot is waiting for the panicking code.
            self.dispatcher.shut_down(false);
            return;
        }

        self.close(true);
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("affinity_masks", &self.affinity_masks)
            .field("threads_per_core", &self.threads_per_core)
            .field("queued_jobs", &self.queued_jobs())
            .field("is_closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`ThreadPool`].
///
/// # Example
///
/// ```
/// use core_local::ThreadPool;
/// use new_zealand::nz;
///
/// let pool = ThreadPool::builder()
///     .cores(nz!(1))
///     .threads_per_core(nz!(2))
///     .thread_name_prefix("matmul")
///     .build();
///
/// assert_eq!(pool.core_count(), 1);
/// assert_eq!(pool.threads_per_core().get(), 2);
/// ```
#[derive(Debug)]
pub struct ThreadPoolBuilder {
    cores: Option<NonZero<usize>>,
    threads_per_core: Option<NonZero<usize>>,
    topology: Option<Topology>,
    thread_name_prefix: String,
}

impl ThreadPoolBuilder {
    fn new() -> Self {
        Self {
            cores: None,
            threads_per_core: None,
            topology: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// Sets how many physical cores the pool uses, starting from core 0.
    ///
    /// Default is every physical core. Asking for more cores than the system has makes
    /// [`try_build()`][Self::try_build] fail.
    #[must_use]
    pub fn cores(mut self, count: NonZero<usize>) -> Self {
        self.cores = Some(count);
        self
    }

    /// Sets the number of threads per core group, which is also the slot count of every job.
    ///
    /// Default is the number of logical processors divided by the number of cores used, but at
    /// least 1.
    #[must_use]
    pub fn threads_per_core(mut self, count: NonZero<usize>) -> Self {
        self.threads_per_core = Some(count);
        self
    }

    /// Sets the processor topology to use.
    ///
    /// Default is [`Topology::current()`].
    #[must_use]
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Sets the prefix of the pool's thread names.
    ///
    /// Handler threads are named `{prefix}-c{core_index}` and worker threads
    /// `{prefix}-c{core_index}-s{slot_index}`. Default prefix is `core_local`.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Builds the pool, starting and pinning all its threads.
    ///
    /// # Panics
    ///
    /// Panics if [`try_build()`][Self::try_build] fails. A pool that cannot use the processor
    /// topology has no reason to exist.
    #[must_use]
    pub fn build(self) -> ThreadPool {
        self.try_build()
            .expect("thread pool requires a usable processor topology")
    }

    /// Builds the pool, starting and pinning all its threads.
    ///
    /// Returns only after every thread has been pinned to its core.
    ///
    /// # Errors
    ///
    /// Returns the [`TopologyError`] if the topology cannot be queried, if more cores were
    /// requested than exist or if any thread cannot be pinned. Threads started before the failure
    /// are stopped again.
    pub fn try_build(self) -> Result<ThreadPool, TopologyError> {
        let topology = self
            .topology
            .unwrap_or_else(|| Topology::current().clone());

        let physical_core_count = topology.physical_core_count()?;
        let core_count = self.cores.map_or(physical_core_count, NonZero::get);

        let affinity_masks = (0..core_count)
            .map(|core_index| topology.affinity_mask_for(core_index))
            .collect::<Result<Box<[_]>, _>>()?;

        let threads_per_core = match self.threads_per_core {
            Some(count) => count,
            None => topology
                .logical_processor_count()?
                .checked_div(core_count)
                .and_then(NonZero::new)
                .unwrap_or(NonZero::<usize>::MIN),
        };

        let dispatcher = Arc::new(Dispatcher::new());

        let (handler_threads, reports): (Vec<_>, Vec<_>) = affinity_masks
            .iter()
            .enumerate()
            .map(|(core_index, mask)| {
                CoreHandler::new(
                    core_index,
                    mask.clone(),
                    threads_per_core,
                    topology.clone(),
                    Arc::clone(&dispatcher),
                    &self.thread_name_prefix,
                )
                .spawn()
            })
            .unzip();

        // Every handler reports exactly once, after its workers have reported.
        let startup = reports
            .into_iter()
            .map(|report| {
                report
                    .recv()
                    .expect("core handler reports its startup outcome before doing anything else")
            })
            .fold(Ok(()), Result::and);

        let pool = ThreadPool {
            dispatcher,
            handler_threads: Mutex::new(handler_threads),
            affinity_masks,
            threads_per_core,
            physical_core_count,
        };

        if let Err(e) = startup {
            pool.close(false);
            return Err(e);
        }

        debug!(
            cores = pool.core_count(),
            threads_per_core = threads_per_core.get(),
            "thread pool started"
        );

        Ok(pool)
    }
}
