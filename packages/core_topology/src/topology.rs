//! Public handle to a processor topology, supporting both the real system and fake topologies.

#[cfg(any(test, feature = "test-util"))]
use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::error::Result;
#[cfg(any(test, feature = "test-util"))]
use crate::fake::{FakePlatform, FakeTopologyBuilder};
#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{Platform, PlatformFacade};
use crate::{AffinityMask, CoreIndex, TopologyError};

/// The real system topology, initialized on first access.
static CURRENT_TOPOLOGY: OnceLock<Topology> = OnceLock::new();

/// Answers questions about the physical processor cores of a system and pins threads to them.
///
/// The core layout is discovered lazily on first use and cached. All clones of a `Topology`
/// share the same cache. If discovery fails, the failure is returned to the caller but not
/// cached, so the next call tries again.
///
/// # Example
///
/// ```
/// use core_topology::Topology;
///
/// let topology = Topology::current();
///
/// let cores = topology.physical_core_count().unwrap();
/// let processors = topology.logical_processor_count().unwrap();
/// println!("{cores} physical cores with {processors} logical processors in total");
///
/// let first_core = topology.affinity_mask_for(0).unwrap();
/// println!("core 0 consists of processors {first_core}");
/// ```
#[derive(Clone)]
pub struct Topology {
    inner: Arc<TopologyInner>,
}

struct TopologyInner {
    platform: PlatformFacade,

    /// Physical cores in core index order, once successfully discovered.
    cores: Mutex<Option<Arc<[AffinityMask]>>>,
}

impl Topology {
    /// Returns a handle to the topology of the system the process is running on.
    ///
    /// The handle is created on first access and reused thereafter.
    #[must_use]
    pub fn current() -> &'static Self {
        CURRENT_TOPOLOGY.get_or_init(|| Self::from_platform(PlatformFacade::target()))
    }

    /// Creates a simulated topology for testing purposes.
    ///
    /// Each fake topology is independent, so parallel tests can use their own without
    /// interfering with each other. Clones represent the same fake topology.
    ///
    /// # Example
    ///
    /// ```
    /// use core_topology::Topology;
    /// use core_topology::fake::FakeTopologyBuilder;
    /// use new_zealand::nz;
    ///
    /// let topology = Topology::fake(FakeTopologyBuilder::from_counts(nz!(2), nz!(4)));
    ///
    /// assert_eq!(topology.physical_core_count().unwrap(), 2);
    /// assert_eq!(topology.affinity_mask_for(1).unwrap().len(), 4);
    /// ```
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn fake(builder: impl Borrow<FakeTopologyBuilder>) -> Self {
        Self::from_platform(PlatformFacade::from_fake(FakePlatform::from_builder(
            builder.borrow(),
        )))
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::from_platform(PlatformFacade::from_mock(mock))
    }

    fn from_platform(platform: PlatformFacade) -> Self {
        Self {
            inner: Arc::new(TopologyInner {
                platform,
                cores: Mutex::new(None),
            }),
        }
    }

    /// Number of physical processor cores available to the current process.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::QueryFailed`] if the operating system could not be queried.
    pub fn physical_core_count(&self) -> Result<usize> {
        Ok(self.cores()?.len())
    }

    /// Number of logical processors (hardware threads) available to the current process, summed
    /// over all physical cores.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::QueryFailed`] if the operating system could not be queried.
    pub fn logical_processor_count(&self) -> Result<usize> {
        Ok(self.cores()?.iter().map(AffinityMask::len).sum())
    }

    /// The logical processors that make up physical core `core_index`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::CoreIndexOutOfRange`] if there is no such core and
    /// [`TopologyError::QueryFailed`] if the operating system could not be queried.
    pub fn affinity_mask_for(&self, core_index: CoreIndex) -> Result<AffinityMask> {
        let cores = self.cores()?;

        cores
            .get(core_index)
            .cloned()
            .ok_or(TopologyError::CoreIndexOutOfRange {
                index: core_index,
                core_count: cores.len(),
            })
    }

    /// The affinity masks of every physical core, in core index order.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::QueryFailed`] if the operating system could not be queried.
    pub fn core_masks(&self) -> Result<Vec<AffinityMask>> {
        Ok(self.cores()?.to_vec())
    }

    /// Restricts the calling thread to the logical processors in `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PinFailed`] if the operating system refused the request.
    pub fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        self.inner.platform.pin_current_thread_to(mask)
    }

    /// The logical processors the calling thread is currently allowed to run on.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::QueryFailed`] if the operating system could not be queried.
    pub fn current_thread_affinity(&self) -> Result<AffinityMask> {
        self.inner.platform.current_thread_affinity()
    }

    fn cores(&self) -> Result<Arc<[AffinityMask]>> {
        let mut cached = self.inner.cores.lock();

        if let Some(cores) = cached.as_ref() {
            return Ok(Arc::clone(cores));
        }

        let cores: Arc<[AffinityMask]> = match self.inner.platform.core_masks() {
            Ok(cores) => cores.into_iter().collect(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "processor topology query failed, will retry on next use"
                );
                return Err(e);
            }
        };

        tracing::debug!(physical_cores = cores.len(), "discovered processor topology");

        *cached = Some(Arc::clone(&cores));
        Ok(cores)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("platform", &self.inner.platform)
            .field("cores", &*self.inner.cores.lock())
            .finish()
    }
}
