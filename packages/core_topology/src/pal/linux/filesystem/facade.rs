use std::fmt::Debug;
#[cfg(test)]
use std::sync::Arc;

use crate::ProcessorId;
#[cfg(test)]
use crate::pal::linux::MockFilesystem;
use crate::pal::linux::{BuildTargetFilesystem, Filesystem};

/// Enum to hide the different filesystem implementations behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum FilesystemFacade {
    Target(&'static BuildTargetFilesystem),

    #[cfg(test)]
    Mock(Arc<MockFilesystem>),
}

impl FilesystemFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetFilesystem)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockFilesystem) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Filesystem for FilesystemFacade {
    fn get_cpu_online_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cpu_online_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cpu_online_contents(),
        }
    }

    fn get_core_cpus_list_contents(&self, processor: ProcessorId) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_core_cpus_list_contents(processor),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_core_cpus_list_contents(processor),
        }
    }

    fn get_proc_self_status_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_proc_self_status_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_proc_self_status_contents(),
        }
    }
}

impl Debug for FilesystemFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
