#![cfg_attr(
    test,
    expect(
        clippy::struct_field_names,
        reason = "false positive from automock generated code"
    )
)]

use std::fmt::Debug;

use nonempty::NonEmpty;

use crate::AffinityMask;
use crate::error::Result;

/// The operating system facilities the topology layer depends on.
///
/// All topology queries and thread affinity changes go through this trait, enabling them to be
/// mocked or replaced by a simulated topology.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Queries the physical cores of the system, one affinity mask per core.
    ///
    /// The masks are ordered by their lowest logical processor and never overlap. Only online
    /// logical processors are included.
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>>;

    /// Restricts the current thread to the logical processors in the mask.
    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()>;

    /// The set of logical processors the current thread is currently allowed to run on.
    fn current_thread_affinity(&self) -> Result<AffinityMask>;
}
