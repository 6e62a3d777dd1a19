//! Windows topology discovery via `GetLogicalProcessorInformation`.
//!
//! Only processor group 0 is visible through this API, which limits the supported systems to
//! 64 logical processors.

use std::mem;

use nonempty::NonEmpty;
use windows::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows::Win32::System::SystemInformation::{
    GROUP_AFFINITY, GetLogicalProcessorInformation, RelationProcessorCore,
    SYSTEM_LOGICAL_PROCESSOR_INFORMATION,
};
use windows::Win32::System::Threading::{
    GetCurrentThread, GetThreadGroupAffinity, SetThreadAffinityMask,
};

use crate::error::Result;
use crate::pal::Platform;
use crate::{AffinityMask, ProcessorId, TopologyError};

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

impl BuildTargetPlatform {
    fn logical_processor_information() -> Result<Vec<SYSTEM_LOGICAL_PROCESSOR_INFORMATION>> {
        let mut length_bytes = 0_u32;

        // SAFETY: With no buffer, the call only writes the required length.
        let probe = unsafe { GetLogicalProcessorInformation(None, &raw mut length_bytes) };

        match probe {
            Err(e) if e.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() => {}
            Err(e) => {
                return Err(TopologyError::query_failed(format!(
                    "GetLogicalProcessorInformation failed: {e}"
                )));
            }
            Ok(()) => return Ok(Vec::new()),
        }

        let entry_count = (length_bytes as usize)
            .div_ceil(mem::size_of::<SYSTEM_LOGICAL_PROCESSOR_INFORMATION>());
        let mut buffer = vec![SYSTEM_LOGICAL_PROCESSOR_INFORMATION::default(); entry_count];

        // SAFETY: The buffer is at least `length_bytes` long, as requested by the OS.
        unsafe {
            GetLogicalProcessorInformation(Some(buffer.as_mut_ptr()), &raw mut length_bytes)
        }
        .map_err(|e| {
            TopologyError::query_failed(format!("GetLogicalProcessorInformation failed: {e}"))
        })?;

        buffer.truncate(
            length_bytes as usize / mem::size_of::<SYSTEM_LOGICAL_PROCESSOR_INFORMATION>(),
        );

        Ok(buffer)
    }
}

fn mask_to_processors(mask: usize) -> impl Iterator<Item = ProcessorId> {
    (0..usize::BITS).filter(move |bit| mask & (1_usize << bit) != 0)
}

fn processors_to_mask(mask: &AffinityMask) -> Option<usize> {
    mask.processors()
        .try_fold(0_usize, |acc, p| 1_usize.checked_shl(p).map(|bit| acc | bit))
}

impl Platform for BuildTargetPlatform {
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>> {
        let mut cores = Self::logical_processor_information()?
            .into_iter()
            .filter(|info| info.Relationship == RelationProcessorCore)
            .filter_map(|info| {
                AffinityMask::from_processors(mask_to_processors(info.ProcessorMask))
            })
            .collect::<Vec<_>>();

        cores.sort_by_key(AffinityMask::first);

        NonEmpty::from_vec(cores)
            .ok_or_else(|| TopologyError::query_failed("the system reported no processor cores"))
    }

    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        let raw_mask = processors_to_mask(mask).ok_or_else(|| TopologyError::PinFailed {
            mask: mask.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "processor is outside processor group 0",
            ),
        })?;

        // SAFETY: No safety requirements beyond passing valid arguments.
        let previous = unsafe { SetThreadAffinityMask(GetCurrentThread(), raw_mask) };

        if previous == 0 {
            return Err(TopologyError::PinFailed {
                mask: mask.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(())
    }

    fn current_thread_affinity(&self) -> Result<AffinityMask> {
        let mut affinity = GROUP_AFFINITY::default();

        // SAFETY: The out pointer is valid for writes. The pseudo-handle needs no closing.
        unsafe { GetThreadGroupAffinity(GetCurrentThread(), &raw mut affinity) }
            .map_err(|e| {
                TopologyError::query_failed(format!("GetThreadGroupAffinity failed: {e}"))
            })?;

        AffinityMask::from_processors(mask_to_processors(affinity.Mask))
            .ok_or_else(|| TopologyError::query_failed("thread affinity contains no processors"))
    }
}
