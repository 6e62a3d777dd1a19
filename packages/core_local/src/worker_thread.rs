use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_topology::{AffinityMask, CoreIndex, Topology, TopologyError};
use tracing::{debug, trace, warn};

use crate::CoreHandshake;
use crate::panic_trap::run_slot;

/// A thread of a core group other than the handler's own. Executes the slot with index
/// `worker_index + 1` of every job its core handler picks up.
#[derive(Debug)]
pub(crate) struct WorkerThread {
    core_index: CoreIndex,
    worker_index: usize,
    mask: AffinityMask,
    topology: Topology,
    handshake: Arc<CoreHandshake>,
}

impl WorkerThread {
    pub(crate) fn new(
        core_index: CoreIndex,
        worker_index: usize,
        mask: AffinityMask,
        topology: Topology,
        handshake: Arc<CoreHandshake>,
    ) -> Self {
        Self {
            core_index,
            worker_index,
            mask,
            topology,
            handshake,
        }
    }

    fn slot_index(&self) -> usize {
        self.worker_index
            .checked_add(1)
            .expect("worker count is bounded by the number of slots in a job")
    }

    /// Starts the thread. The receiver gets the outcome of pinning the thread to its core before
    /// the thread accepts any work.
    pub(crate) fn spawn(
        self,
        thread_name: String,
    ) -> (JoinHandle<()>, oneshot::Receiver<Result<(), TopologyError>>) {
        let (report_tx, report_rx) = oneshot::channel();

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run(report_tx))
            .expect("failed to spawn worker thread, spawn failure is not supported");

        (handle, report_rx)
    }

    fn run(self, report: oneshot::Sender<Result<(), TopologyError>>) {
        let core_index = self.core_index;
        let slot_index = self.slot_index();

        if let Err(e) = self.topology.pin_current_thread_to(&self.mask) {
            warn!(core_index, slot_index, error = %e, "worker thread could not be pinned");
            // The handler may have given up on us already, nothing to do about that.
            drop(report.send(Err(e)));
            return;
        }

        debug!(core_index, slot_index, mask = %self.mask, "worker thread started");
        drop(report.send(Ok(())));

        while let Some(slot) = self.handshake.next_slot(self.worker_index) {
            trace!(core_index, slot_index, "worker running slot");
            run_slot(slot, core_index, slot_index);
            self.handshake.slot_finished(self.worker_index);
        }

        debug!(core_index, slot_index, "worker thread exiting");
    }
}
