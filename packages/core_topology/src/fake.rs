//! Simulated processor topologies for testing.
//!
//! A fake topology behaves like the real one from the point of view of its callers: it reports
//! physical cores and their affinity masks, and it remembers which mask each thread was pinned to
//! so that [`Topology::current_thread_affinity()`][crate::Topology::current_thread_affinity]
//! reflects pinning done through the same `Topology`. No OS-level affinity is ever changed.
//!
//! Only available when the `test-util` Cargo feature is enabled.
//!
//! # Example
//!
//! ```
//! use core_topology::Topology;
//! use core_topology::fake::FakeTopologyBuilder;
//! use new_zealand::nz;
//!
//! // 4 physical cores with 2 hyperthreads each.
//! let topology = Topology::fake(FakeTopologyBuilder::from_counts(nz!(4), nz!(2)));
//!
//! assert_eq!(topology.physical_core_count().unwrap(), 4);
//! assert_eq!(topology.logical_processor_count().unwrap(), 8);
//! ```
//!
//! # Designing testable code
//!
//! Accept a [`Topology`][crate::Topology] as a parameter instead of always calling
//! [`Topology::current()`][crate::Topology::current], so tests can substitute a fake one.

mod builder;
mod platform;

pub use builder::*;
pub(crate) use platform::*;
