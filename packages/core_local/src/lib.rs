#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Thread pool that runs groups of cooperating tasks on the logical processors of one physical
//! core.
//!
//! Logical processors (hardware threads) of the same physical core share the L1 and L2 caches.
//! Work that splits one data set over a few threads, such as one tile of a tiled matrix
//! multiplication, runs fastest when all those threads sit on the same physical core and no other
//! work competes with them for the caches. This pool makes that arrangement explicit:
//!
//! * The pool has one core group per physical core. A core group is `threads_per_core` threads,
//!   all pinned to the same physical core. No two core groups share a logical processor.
//! * A [`Job`] has exactly one slot per thread of a core group. Slot `i` always runs on thread
//!   `i` of whichever core group picks up the job.
//! * Jobs are taken from a single queue in submission order. A core group runs one job at a time
//!   and does not start the next job until every slot of the current one has finished.
//!
//! # Quick start
//!
//! ```rust
//! use core_local::{Job, ThreadPool};
//!
//! let pool = ThreadPool::new();
//!
//! for tile in 0..4 {
//!     pool.add(Job::from_fn(pool.threads_per_core().get(), |slot_index| {
//!         move || println!("tile {tile}, part {slot_index}")
//!     }))
//!     .unwrap();
//! }
//!
//! // Waits for all the queued jobs to finish.
//! pool.close(true);
//! ```
//!
//! Use [`ThreadPool::add_with_results()`] when the slots return values.
//!
//! # Shutdown behavior
//!
//! [`ThreadPool::close(true)`][ThreadPool::close] runs every queued job before stopping the
//! threads. `close(false)` only lets each core group finish the job it is running and drops the
//! rest. Dropping the pool without closing it is the same as `close(true)`.
//!
//! # Logging
//!
//! The pool logs through `tracing`: thread lifecycle at `debug` level, every job phase of a core
//! group at `trace` level and panicking slots at `error` level.

mod core_handler;
mod dispatch;
mod error;
mod handshake;
mod job;
mod job_handle;
mod job_queue;
mod panic_trap;
mod pool;
mod worker_thread;

pub(crate) use core_handler::*;
pub(crate) use dispatch::*;
pub use error::*;
pub(crate) use handshake::*;
pub use job::*;
pub use job_handle::JobHandle;
pub(crate) use job_queue::*;
pub use pool::*;
pub(crate) use worker_thread::*;
