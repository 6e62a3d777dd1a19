use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use core_topology::CoreIndex;

use crate::Slot;

/// Runs a slot, logging and discarding any panic so the calling thread stays in service.
pub(crate) fn run_slot(slot: Slot, core_index: CoreIndex, slot_index: usize) {
    // The slot is consumed by the call, nothing observes its state after a panic.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(slot)) {
        tracing::error!(
            core_index,
            slot_index,
            panic_message = %describe_panic(&*payload),
            "job slot panicked, the panic has been discarded"
        );
    }
}

/// Extracts the message from a panic payload, for logging.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
