//! Activation and completion signals between a core handler and its worker threads.

use parking_lot::{Condvar, Mutex};

use crate::Slot;

struct HandshakeState {
    /// The slot each worker is to execute next, indexed by worker index.
    slots: Vec<Option<Slot>>,

    /// Set by the handler when a worker has a slot to run, cleared by the worker when done.
    online: Vec<bool>,

    terminate: bool,
}

/// State shared by the threads of one core group, guarded by the per-core lock.
///
/// Two separate condition variables are used so that a "start" signal meant for the workers can
/// never be consumed by the handler waiting for "done", and the other way around.
pub(crate) struct CoreHandshake {
    state: Mutex<HandshakeState>,
    activate: Condvar,
    completed: Condvar,
}

impl CoreHandshake {
    pub(crate) fn new(worker_count: usize) -> Self {
        Self {
            state: Mutex::new(HandshakeState {
                slots: std::iter::repeat_with(|| None).take(worker_count).collect(),
                online: vec![false; worker_count],
                terminate: false,
            }),
            activate: Condvar::new(),
            completed: Condvar::new(),
        }
    }

    /// Hands one slot to each worker, in worker index order, and wakes them all.
    pub(crate) fn fan_out(&self, slots: impl IntoIterator<Item = Slot>) {
        let mut state = self.state.lock();
        let state = &mut *state;

        for ((target, online), slot) in state
            .slots
            .iter_mut()
            .zip(state.online.iter_mut())
            .zip(slots)
        {
            debug_assert!(!*online, "worker is still busy with the previous job");

            *target = Some(slot);
            *online = true;
        }

        self.activate.notify_all();
    }

    /// Blocks until every worker has finished the slot it was given by `fan_out()`.
    pub(crate) fn wait_for_workers(&self) {
        let mut state = self.state.lock();

        while state.online.iter().any(|online| *online) {
            self.completed.wait(&mut state);
        }
    }

    /// Tells every worker to exit once it has nothing left to do.
    pub(crate) fn terminate(&self) {
        self.state.lock().terminate = true;
        self.activate.notify_all();
    }

    /// Blocks until the worker has a slot to run. Returns `None` when the worker should exit.
    pub(crate) fn next_slot(&self, worker_index: usize) -> Option<Slot> {
        let mut state = self.state.lock();

        loop {
            if state.terminate {
                return None;
            }

            let online = *state
                .online
                .get(worker_index)
                .expect("worker index is always within the core's worker count");

            if online {
                return Some(
                    state
                        .slots
                        .get_mut(worker_index)
                        .and_then(Option::take)
                        .expect("an online worker always has a slot waiting for it"),
                );
            }

            self.activate.wait(&mut state);
        }
    }

    /// Marks the worker's slot as done and wakes the handler if it is draining.
    pub(crate) fn slot_finished(&self, worker_index: usize) {
        let mut state = self.state.lock();

        *state
            .online
            .get_mut(worker_index)
            .expect("worker index is always within the core's worker count") = false;

        // Only the handler ever waits on `completed`.
        self.completed.notify_one();
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl std::fmt::Debug for CoreHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();

        f.debug_struct("CoreHandshake")
            .field("online", &state.online)
            .field("terminate", &state.terminate)
            .finish_non_exhaustive()
    }
}
