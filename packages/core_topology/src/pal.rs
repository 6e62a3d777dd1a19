//! Platform Abstraction Layer (PAL). This is private API that hides the operating system
//! specific ways of discovering physical cores and pinning threads behind one trait.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

#[cfg(all(target_os = "linux", not(miri)))]
mod linux;
#[cfg(all(target_os = "linux", not(miri)))]
pub(crate) use linux::*;

#[cfg(all(windows, not(miri)))]
mod windows;
#[cfg(all(windows, not(miri)))]
pub(crate) use windows::*;

// The fallback module is compiled in test mode on all platforms so its logic is always covered.
// It is only glob-imported when it is the primary implementation, otherwise it is reachable via
// the explicit `fallback::` path.
#[cfg(any(test, miri, not(any(target_os = "linux", windows))))]
pub(crate) mod fallback;

#[cfg(any(miri, not(any(target_os = "linux", windows))))]
pub(crate) use fallback::*;
