#![cfg_attr(
    test,
    expect(
        clippy::struct_field_names,
        reason = "false positive from automock generated code"
    )
)]

use std::fmt::Debug;

use crate::ProcessorId;

/// The parts of the sysfs virtual filesystem that describe processor topology. Abstracted so
/// that the topology parsing logic can be tested against arbitrary (mock) machines.
///
/// All I/O is synchronous and blocking because the data never lives on a real storage device.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Filesystem: Debug + Send + Sync + 'static {
    /// Gets the contents of the /sys/devices/system/cpu/online file or `None` if it cannot be
    /// read.
    ///
    /// This is a cpulist format file ("0,1,2-4,5-10:2" style list).
    fn get_cpu_online_contents(&self) -> Option<String>;

    /// Gets the list of logical processors that share a physical core with the given
    /// processor, including the processor itself, or `None` if it cannot be read.
    ///
    /// This is `/sys/devices/system/cpu/cpu{}/topology/core_cpus_list`, falling back to the
    /// older `thread_siblings_list` name. It is a cpulist format file.
    fn get_core_cpus_list_contents(&self, processor: ProcessorId) -> Option<String>;

    /// Gets the contents of the /proc/self/status file for the current process or `None` if it
    /// cannot be read.
    ///
    /// This is a plaintext file with "key:     value" pairs. We are interested in the
    /// `Cpus_allowed_list` entry, which reflects cgroup cpusets and `taskset` restrictions.
    fn get_proc_self_status_contents(&self) -> Option<String>;
}
