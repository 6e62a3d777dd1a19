#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Discovers the physical processor cores of the system and pins threads to them.
//!
//! A physical core usually exposes more than one logical processor (hardware thread) to the
//! operating system. Logical processors of the same physical core share the L1 and L2 caches, so
//! a group of threads that cooperates on one data set benefits from running on a single physical
//! core. This package answers three questions:
//!
//! * How many physical cores and logical processors are available to this process?
//! * Which logical processors make up physical core `i`? The answer is an [`AffinityMask`].
//! * How do I restrict the current thread to one physical core?
//!
//! # Example
//!
//! ```
//! use core_topology::Topology;
//!
//! let topology = Topology::current();
//! let core0 = topology.affinity_mask_for(0).unwrap();
//!
//! std::thread::spawn(move || {
//!     Topology::current().pin_current_thread_to(&core0).unwrap();
//!
//!     // From here on, this thread only runs on the logical processors of core 0.
//! })
//! .join()
//! .unwrap();
//! ```
//!
//! # Testing
//!
//! With the `test-util` feature enabled, [`Topology::fake()`] creates a simulated topology that
//! does not touch the operating system. See the `fake` module.
//!
//! # Platform support
//!
//! * Linux: the topology comes from sysfs and respects the process affinity (e.g. a container
//!   restricted to some processors only sees the cores of those processors).
//! * Windows: only processor group 0 (the first 64 logical processors) is supported.
//! * Other platforms: every logical processor is reported as its own physical core and pinning is
//!   only simulated.

mod affinity_mask;
mod error;
mod pal;
mod primitive_types;
mod topology;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use affinity_mask::*;
pub use error::TopologyError;
pub use primitive_types::*;
pub use topology::Topology;
