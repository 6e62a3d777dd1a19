use std::num::NonZero;
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_topology::{AffinityMask, CoreIndex, Topology, TopologyError};
use tracing::{debug, trace, warn};

use crate::panic_trap::run_slot;
use crate::{CoreHandshake, Dispatcher, WorkerThread};

/// The states a core handler moves through for every job, named for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Phase {
    /// Waiting for a job to appear in the queue.
    Idle,

    /// Took a job from the queue.
    Dequeuing,

    /// Handing slots 1.. to the worker threads.
    Fanning,

    /// Running slot 0 on the handler's own thread.
    Executing,

    /// Waiting for the worker threads to finish their slots.
    Draining,

    /// Shutting down the worker threads.
    Stopped,
}

/// Supervises one physical core: takes jobs from the pool's queue and runs each one across the
/// threads of the core group, one job at a time.
#[derive(Debug)]
pub(crate) struct CoreHandler {
    core_index: CoreIndex,
    mask: AffinityMask,
    threads_per_core: NonZero<usize>,
    topology: Topology,
    dispatcher: Arc<Dispatcher>,
    thread_name: String,
}

impl CoreHandler {
    pub(crate) fn new(
        core_index: CoreIndex,
        mask: AffinityMask,
        threads_per_core: NonZero<usize>,
        topology: Topology,
        dispatcher: Arc<Dispatcher>,
        thread_name_prefix: &str,
    ) -> Self {
        Self {
            core_index,
            mask,
            threads_per_core,
            topology,
            dispatcher,
            thread_name: format!("{thread_name_prefix}-c{core_index}"),
        }
    }

    /// Starts the handler thread, which in turn starts the worker threads of the core.
    ///
    /// The receiver gets the outcome of pinning every thread of the core group, sent before the
    /// handler takes its first job.
    pub(crate) fn spawn(self) -> (JoinHandle<()>, oneshot::Receiver<Result<(), TopologyError>>) {
        let (report_tx, report_rx) = oneshot::channel();

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || self.run(report_tx))
            .expect("failed to spawn core handler thread, spawn failure is not supported");

        (handle, report_rx)
    }

    fn trace_phase(&self, phase: Phase) {
        trace!(core_index = self.core_index, ?phase, "core handler phase");
    }

    #[cfg_attr(test, mutants::skip)] // Mutations here mostly just hang the pool.
    fn run(self, report: oneshot::Sender<Result<(), TopologyError>>) {
        let core_index = self.core_index;

        if let Err(e) = self.topology.pin_current_thread_to(&self.mask) {
            warn!(core_index, error = %e, "core handler thread could not be pinned");
            drop(report.send(Err(e)));
            return;
        }

        let worker_count = self.threads_per_core.get().saturating_sub(1);
        let handshake = Arc::new(CoreHandshake::new(worker_count));

        let (workers, worker_reports): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|worker_index| {
                let slot_index = worker_index.saturating_add(1);

                WorkerThread::new(
                    core_index,
                    worker_index,
                    self.mask.clone(),
                    self.topology.clone(),
                    Arc::clone(&handshake),
                )
                .spawn(format!("{}-s{slot_index}", self.thread_name))
            })
            .unzip();

        // Every worker reports exactly once, so this waits until all of them are settled.
        let startup = worker_reports
            .into_iter()
            .map(|report| {
                report
                    .recv()
                    .expect("worker thread reports its startup outcome before doing anything else")
            })
            .fold(Ok(()), Result::and);

        if let Err(e) = startup {
            stop_workers(&handshake, workers);
            drop(report.send(Err(e)));
            return;
        }

        debug!(core_index, mask = %self.mask, worker_count, "core handler started");

        // If the pool is gone already, the dispatcher will tell us to stop right away.
        drop(report.send(Ok(())));

        self.trace_phase(Phase::Idle);

        while let Some(job) = self.dispatcher.next_job() {
            self.trace_phase(Phase::Dequeuing);

            let mut slots = job.into_slots().into_iter();
            let first_slot = slots
                .next()
                .expect("slot count is validated against threads per core on submission");

            if worker_count > 0 {
                self.trace_phase(Phase::Fanning);
                handshake.fan_out(slots);
            }

            self.trace_phase(Phase::Executing);
            run_slot(first_slot, core_index, 0);

            self.trace_phase(Phase::Draining);
            handshake.wait_for_workers();

            self.trace_phase(Phase::Idle);
        }

        self.trace_phase(Phase::Stopped);
        stop_workers(&handshake, workers);

        debug!(core_index, "core handler exiting");
    }
}

fn stop_workers(handshake: &CoreHandshake, workers: Vec<JoinHandle<()>>) {
    handshake.terminate();

    for worker in workers {
        if let Err(payload) = worker.join() {
            // Slots run inside a panic trap, so a worker panic means the pool itself is broken.
            panic::resume_unwind(payload);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use core_topology::fake::FakeTopologyBuilder;
    use new_zealand::nz;
    use testing::with_watchdog;

    use super::*;
    use crate::Job;

    fn handler(
        topology: &Topology,
        dispatcher: &Arc<Dispatcher>,
        threads: NonZero<usize>,
    ) -> CoreHandler {
        CoreHandler::new(
            1,
            topology.affinity_mask_for(1).unwrap(),
            threads,
            topology.clone(),
            Arc::clone(dispatcher),
            "test",
        )
    }

    #[cfg_attr(miri, ignore)] // Slow under Miri.
    #[test]
    fn runs_every_slot_on_a_pinned_thread() {
        with_watchdog(|| {
            let topology = Topology::fake(FakeTopologyBuilder::from_counts(nz!(2), nz!(3)));
            let dispatcher = Arc::new(Dispatcher::new());

            let (handle, report) = handler(&topology, &dispatcher, nz!(3)).spawn();
            report.recv().unwrap().unwrap();

            let observed = Arc::new(Mutex::new(Vec::new()));

            dispatcher
                .submit(Job::from_fn(3, |slot_index| {
                    let topology = topology.clone();
                    let observed = Arc::clone(&observed);
                    move || {
                        let name = thread::current().name().map(str::to_string);
                        let affinity = topology.current_thread_affinity().unwrap();
                        observed.lock().unwrap().push((slot_index, name, affinity));
                    }
                }))
                .unwrap();

            dispatcher.shut_down(true);
            handle.join().unwrap();

            let mut observed = observed.lock().unwrap().clone();
            observed.sort_by_key(|(slot_index, _, _)| *slot_index);

            let expected_mask = topology.affinity_mask_for(1).unwrap();
            let expected_names = ["test-c1", "test-c1-s1", "test-c1-s2"];

            assert_eq!(observed.len(), 3);
            for ((slot_index, name, affinity), expected_name) in
                observed.iter().zip(expected_names)
            {
                assert_eq!(name.as_deref(), Some(expected_name), "slot {slot_index}");
                assert_eq!(*affinity, expected_mask, "slot {slot_index}");
            }
        });
    }

    #[cfg_attr(miri, ignore)] // Slow under Miri.
    #[test]
    fn panicking_slot_does_not_stop_the_core() {
        with_watchdog(|| {
            let topology = Topology::fake(FakeTopologyBuilder::from_counts(nz!(2), nz!(2)));
            let dispatcher = Arc::new(Dispatcher::new());
            let counter = Arc::new(AtomicUsize::new(0));

            let (handle, report) = handler(&topology, &dispatcher, nz!(2)).spawn();
            report.recv().unwrap().unwrap();

            for _ in 0..3 {
                dispatcher
                    .submit(Job::from_fn(2, |slot_index| {
                        let counter = Arc::clone(&counter);
                        move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                            assert_ne!(slot_index, 1, "slot 1 always fails");
                        }
                    }))
                    .unwrap();
            }

            dispatcher.shut_down(true);
            handle.join().unwrap();

            assert_eq!(counter.load(Ordering::Relaxed), 6);
        });
    }

    #[cfg_attr(miri, ignore)] // Slow under Miri.
    #[test]
    fn single_thread_core_has_no_workers() {
        with_watchdog(|| {
            let topology = Topology::fake(FakeTopologyBuilder::from_counts(nz!(2), nz!(1)));
            let dispatcher = Arc::new(Dispatcher::new());
            let counter = Arc::new(AtomicUsize::new(0));

            let (handle, report) = handler(&topology, &dispatcher, nz!(1)).spawn();
            report.recv().unwrap().unwrap();

            dispatcher
                .submit(Job::from_fn(1, |_| {
                    let counter = Arc::clone(&counter);
                    move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }))
                .unwrap();

            dispatcher.shut_down(true);
            handle.join().unwrap();

            assert_eq!(counter.load(Ordering::Relaxed), 1);
        });
    }
}
