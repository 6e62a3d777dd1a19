use std::fmt::Debug;
#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;

use nonempty::NonEmpty;

use crate::AffinityMask;
use crate::error::Result;
#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakePlatform;
#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{BUILD_TARGET_PLATFORM, BuildTargetPlatform, Platform};

/// Hides the real/fake/mock platform choice behind a single type.
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Target(&'static BuildTargetPlatform),

    #[cfg(any(test, feature = "test-util"))]
    Fake(Arc<FakePlatform>),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

impl PlatformFacade {
    pub(crate) fn target() -> Self {
        Self::Target(&BUILD_TARGET_PLATFORM)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn from_fake(fake: FakePlatform) -> Self {
        Self::Fake(Arc::new(fake))
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Platform for PlatformFacade {
    fn core_masks(&self) -> Result<NonEmpty<AffinityMask>> {
        match self {
            Self::Target(p) => p.core_masks(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.core_masks(),
            #[cfg(test)]
            Self::Mock(p) => p.core_masks(),
        }
    }

    fn pin_current_thread_to(&self, mask: &AffinityMask) -> Result<()> {
        match self {
            Self::Target(p) => p.pin_current_thread_to(mask),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.pin_current_thread_to(mask),
            #[cfg(test)]
            Self::Mock(p) => p.pin_current_thread_to(mask),
        }
    }

    fn current_thread_affinity(&self) -> Result<AffinityMask> {
        match self {
            Self::Target(p) => p.current_thread_affinity(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.current_thread_affinity(),
            #[cfg(test)]
            Self::Mock(p) => p.current_thread_affinity(),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for PlatformFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
