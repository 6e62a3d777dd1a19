use std::fmt::Debug;
use std::fs;

use crate::ProcessorId;
use crate::pal::linux::Filesystem;

/// The virtual filesystem for the real operating system that the build is targeting.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetFilesystem;

// Exercised by the integration tests running on actual Linux.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Filesystem for BuildTargetFilesystem {
    fn get_cpu_online_contents(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/system/cpu/online").ok()
    }

    fn get_core_cpus_list_contents(&self, processor: ProcessorId) -> Option<String> {
        let topology_dir = format!("/sys/devices/system/cpu/cpu{processor}/topology");

        // core_cpus_list replaced thread_siblings_list in Linux 5.6, older kernels only have the
        // latter. Both have identical content.
        fs::read_to_string(format!("{topology_dir}/core_cpus_list"))
            .or_else(|_| fs::read_to_string(format!("{topology_dir}/thread_siblings_list")))
            .ok()
    }

    fn get_proc_self_status_contents(&self) -> Option<String> {
        fs::read_to_string("/proc/self/status").ok()
    }
}
