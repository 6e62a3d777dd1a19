use std::{io, mem};

use libc::cpu_set_t;
use nonempty::NonEmpty;
use tracing::trace;

use crate::error::Result;
use crate::pal::Platform;
use crate::pal::linux::{Bindings, BindingsFacade, Filesystem, FilesystemFacade};
use crate::{AffinityMask, ProcessorId, TopologyError};

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform =
    BuildTargetPlatform::new(FilesystemFacade::target(), BindingsFacade::target());

#[expect(
    clippy::cast_sign_loss,
    reason = "CPU_SETSIZE is a small positive constant"
)]
const CPU_SET_CAPACITY: usize = libc::CPU_SETSIZE as usize;

/// Discovers physical cores from sysfs and pins threads via the scheduler affinity syscalls.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform {
    fs: FilesystemFacade,
    bindings: BindingsFacade,
}

impl BuildTargetPlatform {
    pub(crate) const fn new(fs: FilesystemFacade, bindings: BindingsFacade) -> Self {
        Self { fs, bindings }
    }

    /// Online processors that the process is allowed to use, sorted and de-duplicated.
    fn usable_processors(&self) -> Result<Vec<ProcessorId>> {
        let online = self.fs.get_cpu_online_contents().ok_or_else(|| {
            TopologyError::query_failed("cannot read the list of online processors")
        })?;

        let mut usable = parse_cpulist(&online)?;
        usable.sort_unstable();
        usable.dedup();

        // Cgroup cpusets and `taskset` can exclude processors that are online. Pinning a thread
        // to an excluded processor fails, so such processors are not part of any core.
        if let Some(allowed) = self.allowed_processors()? {
            usable.retain(|p| allowed.binary_search(p).is_ok());
        }

        Ok(usable)
    }

    fn allowed_processors(&self) -> Result<Option<Vec<ProcessorId>>> {
        let Some(status) = self.fs.get_proc_self_status_contents() else {
            return Ok(None);
        };

        let Some(value) = status.lines().find_map(|line| {
            line.strip_prefix("Cpus_allowed_list:")
                .map(str::trim)
        }) else {
            return Ok(None);
        };

        let mut allowed = parse_cpulist(value)?;
        allowed.sort_unstable();

        Ok(Some(allowed))
    }
}

impl Platform for BuildTargetPlatform {
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>> {
        let usable = self.usable_processors()?;

        let mut cores: Vec<AffinityMask> = Vec::new();

        for &processor in &usable {
            if cores.iter().any(|core| core.contains(processor)) {
                continue;
            }

            let siblings = self
                .fs
                .get_core_cpus_list_contents(processor)
                .ok_or_else(|| {
                    TopologyError::query_failed(format!(
                        "cannot read the core siblings of processor {processor}"
                    ))
                })?;

            let mask = AffinityMask::from_processors(
                parse_cpulist(&siblings)?
                    .into_iter()
                    .filter(|p| usable.binary_search(p).is_ok()),
            )
            .filter(|mask| mask.contains(processor))
            .ok_or_else(|| {
                TopologyError::query_failed(format!(
                    "processor {processor} is not listed among its own core siblings"
                ))
            })?;

            if let Some(existing) = cores.iter().find(|core| core.overlaps(&mask)) {
                return Err(TopologyError::query_failed(format!(
                    "inconsistent core membership: processors {existing} and {mask} overlap"
                )));
            }

            trace!(core_index = cores.len(), %mask, "discovered physical core");
            cores.push(mask);
        }

        NonEmpty::from_vec(cores)
            .ok_or_else(|| TopologyError::query_failed("the process may not use any processor"))
    }

    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };

        for processor in mask.processors() {
            let index = processor as usize;

            if index >= CPU_SET_CAPACITY {
                return Err(TopologyError::PinFailed {
                    mask: mask.clone(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("processor {processor} does not fit into cpu_set_t"),
                    ),
                });
            }

            // SAFETY: The index is within the bounds of the set, checked above.
            unsafe { libc::CPU_SET(index, &mut cpuset) };
        }

        self.bindings
            .sched_setaffinity_current(&cpuset)
            .map_err(|source| TopologyError::PinFailed {
                mask: mask.clone(),
                source,
            })
    }

    fn current_thread_affinity(&self) -> Result<AffinityMask> {
        let cpuset = self.bindings.sched_getaffinity_current().map_err(|e| {
            TopologyError::query_failed(format!("cannot read current thread affinity: {e}"))
        })?;

        let processors = (0..CPU_SET_CAPACITY)
            // SAFETY: The index is within the bounds of the set.
            .filter(|index| unsafe { libc::CPU_ISSET(*index, &cpuset) })
            .map(|index| {
                ProcessorId::try_from(index).expect("cpu_set_t capacity always fits into u32")
            });

        AffinityMask::from_processors(processors).ok_or_else(|| {
            TopologyError::query_failed("current thread affinity contains no processors")
        })
    }
}

fn parse_cpulist(contents: &str) -> Result<Vec<ProcessorId>> {
    let contents = contents.trim();

    cpulist::parse(contents).map_err(|e| {
        TopologyError::query_failed(format!("malformed processor list '{contents}': {e}"))
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::pal::linux::{MockBindings, MockFilesystem};

    fn mask(processors: &[ProcessorId]) -> AffinityMask {
        AffinityMask::from_processors(processors.iter().copied()).unwrap()
    }

    fn platform_with_fs(fs: MockFilesystem) -> BuildTargetPlatform {
        BuildTargetPlatform::new(
            FilesystemFacade::from_mock(fs),
            BindingsFacade::from_mock(MockBindings::new()),
        )
    }

    fn platform_with_bindings(bindings: MockBindings) -> BuildTargetPlatform {
        BuildTargetPlatform::new(
            FilesystemFacade::from_mock(MockFilesystem::new()),
            BindingsFacade::from_mock(bindings),
        )
    }

    /// Configures the filesystem to report the given siblings for each listed processor.
    fn expect_siblings(fs: &mut MockFilesystem, siblings: &[(ProcessorId, &'static str)]) {
        for &(processor, list) in siblings {
            fs.expect_get_core_cpus_list_contents()
                .with(eq(processor))
                .times(1)
                .return_const(Some(format!("{list}\n")));
        }
    }

    fn set_of(processors: &[usize]) -> cpu_set_t {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };

        for &p in processors {
            // SAFETY: Test inputs are far below CPU_SETSIZE.
            unsafe { libc::CPU_SET(p, &mut cpuset) };
        }

        cpuset
    }

    #[test]
    fn hyperthreaded_siblings_form_one_core() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0-3\n".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(None::<String>);
        expect_siblings(&mut fs, &[(0, "0,2"), (1, "1,3")]);

        let cores = platform_with_fs(fs).core_masks().unwrap();

        assert_eq!(cores.len(), 2);
        assert_eq!(cores.first(), &mask(&[0, 2]));
        assert_eq!(cores.last(), &mask(&[1, 3]));
    }

    #[test]
    fn no_smt_means_one_processor_per_core() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0-2".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(None::<String>);
        expect_siblings(&mut fs, &[(0, "0"), (1, "1"), (2, "2")]);

        let cores = platform_with_fs(fs).core_masks().unwrap();

        assert_eq!(
            cores.into_iter().collect::<Vec<_>>(),
            vec![mask(&[0]), mask(&[1]), mask(&[2])]
        );
    }

    #[test]
    fn offline_siblings_are_excluded() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0-1".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(None::<String>);
        expect_siblings(&mut fs, &[(0, "0,2"), (1, "1,3")]);

        let cores = platform_with_fs(fs).core_masks().unwrap();

        assert_eq!(
            cores.into_iter().collect::<Vec<_>>(),
            vec![mask(&[0]), mask(&[1])]
        );
    }

    #[test]
    fn disallowed_processors_are_excluded() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0-3".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(Some(
            "Name:\ttest\nCpus_allowed:\t0c\nCpus_allowed_list:\t2-3\nMems_allowed_list:\t0\n"
                .to_string(),
        ));
        expect_siblings(&mut fs, &[(2, "0,2"), (3, "1,3")]);

        let cores = platform_with_fs(fs).core_masks().unwrap();

        assert_eq!(
            cores.into_iter().collect::<Vec<_>>(),
            vec![mask(&[2]), mask(&[3])]
        );
    }

    #[test]
    fn unreadable_online_list_is_query_failure() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents().return_const(None::<String>);

        let result = platform_with_fs(fs).core_masks();

        assert!(matches!(result, Err(TopologyError::QueryFailed { .. })));
    }

    #[test]
    fn malformed_online_list_is_query_failure() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("zero-three".to_string()));

        let result = platform_with_fs(fs).core_masks();

        assert!(matches!(result, Err(TopologyError::QueryFailed { .. })));
    }

    #[test]
    fn missing_siblings_is_query_failure() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(None::<String>);
        fs.expect_get_core_cpus_list_contents().return_const(None::<String>);

        let result = platform_with_fs(fs).core_masks();

        assert!(matches!(result, Err(TopologyError::QueryFailed { .. })));
    }

    #[test]
    fn overlapping_cores_are_query_failure() {
        let mut fs = MockFilesystem::new();
        fs.expect_get_cpu_online_contents()
            .return_const(Some("0-2".to_string()));
        fs.expect_get_proc_self_status_contents().return_const(None::<String>);
        expect_siblings(&mut fs, &[(0, "0-1"), (2, "1-2")]);

        let result = platform_with_fs(fs).core_masks();

        assert!(matches!(result, Err(TopologyError::QueryFailed { .. })));
    }

    #[test]
    fn pin_sets_exactly_the_mask_processors() {
        let mut bindings = MockBindings::new();
        bindings
            .expect_sched_setaffinity_current()
            .withf(|cpuset| {
                // SAFETY: Indexes are within bounds.
                unsafe {
                    libc::CPU_ISSET(1, cpuset)
                        && libc::CPU_ISSET(5, cpuset)
                        && !libc::CPU_ISSET(0, cpuset)
                        && !libc::CPU_ISSET(3, cpuset)
                }
            })
            .times(1)
            .returning(|_| Ok(()));

        platform_with_bindings(bindings)
            .pin_current_thread_to(&mask(&[1, 5]))
            .unwrap();
    }

    #[test]
    fn pin_failure_reports_mask_and_os_error() {
        let mut bindings = MockBindings::new();
        bindings
            .expect_sched_setaffinity_current()
            .returning(|_| Err(io::Error::from_raw_os_error(libc::EINVAL)));

        let result = platform_with_bindings(bindings).pin_current_thread_to(&mask(&[4]));

        match result {
            Err(TopologyError::PinFailed { mask: failed, source }) => {
                assert_eq!(failed, mask(&[4]));
                assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
            }
            other => panic!("expected PinFailed, got {other:?}"),
        }
    }

    #[test]
    fn pin_rejects_processor_beyond_cpu_set() {
        let platform = platform_with_bindings(MockBindings::new());

        let too_large = ProcessorId::try_from(CPU_SET_CAPACITY).unwrap();
        let result = platform.pin_current_thread_to(&AffinityMask::single(too_large));

        assert!(matches!(result, Err(TopologyError::PinFailed { .. })));
    }

    #[test]
    fn current_affinity_reads_set_bits() {
        let mut bindings = MockBindings::new();
        bindings
            .expect_sched_getaffinity_current()
            .returning(|| Ok(set_of(&[2, 3, 10])));

        let affinity = platform_with_bindings(bindings)
            .current_thread_affinity()
            .unwrap();

        assert_eq!(affinity, mask(&[2, 3, 10]));
    }

    #[test]
    fn current_affinity_failure_is_query_failure() {
        let mut bindings = MockBindings::new();
        bindings
            .expect_sched_getaffinity_current()
            .returning(|| Err(io::Error::from_raw_os_error(libc::EFAULT)));

        let result = platform_with_bindings(bindings).current_thread_affinity();

        assert!(matches!(result, Err(TopologyError::QueryFailed { .. })));
    }
}
