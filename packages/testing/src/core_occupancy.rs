use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use foldhash::HashMap;
use parking_lot::Mutex;

/// Detects two different jobs running on the same core at the same time.
///
/// Every slot of a job calls [`enter()`][Self::enter] with the key of the core it runs on and the
/// ID of its job, and keeps the returned guard alive while it works. If a slot enters a core
/// while slots of a different job are still active there, a violation is counted.
///
/// # Example
///
/// ```rust
/// use testing::CoreOccupancy;
///
/// let occupancy = CoreOccupancy::new();
///
/// {
///     let _a = occupancy.enter(0, 1);
///     let _b = occupancy.enter(0, 1); // Same job, no problem.
/// }
///
/// let _c = occupancy.enter(0, 2); // Job 1 already finished, no problem.
///
/// assert_eq!(occupancy.violations(), 0);
/// ```
#[derive(Debug)]
pub struct CoreOccupancy<K> {
    cores: Mutex<HashMap<K, Occupant>>,
    violations: AtomicUsize,
}

#[derive(Debug)]
struct Occupant {
    job_id: u64,
    active_slots: usize,
}

impl<K> CoreOccupancy<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a detector with no active jobs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cores: Mutex::new(HashMap::default()),
            violations: AtomicUsize::new(0),
        }
    }

    /// Marks one slot of job `job_id` as running on `core` until the guard is dropped.
    pub fn enter(&self, core: K, job_id: u64) -> OccupancyGuard<'_, K> {
        let mut cores = self.cores.lock();

        let occupant = cores.entry(core.clone()).or_insert(Occupant {
            job_id,
            active_slots: 0,
        });

        if occupant.active_slots > 0 && occupant.job_id != job_id {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }

        occupant.job_id = job_id;
        occupant.active_slots = occupant.active_slots.saturating_add(1);

        OccupancyGuard { owner: self, core }
    }

    /// How many times a slot entered a core that was busy with a different job.
    #[must_use]
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::Relaxed)
    }

    fn exit(&self, core: &K) {
        let mut cores = self.cores.lock();

        let occupant = cores
            .get_mut(core)
            .expect("a guard only exists for a core that was entered");
        occupant.active_slots = occupant
            .active_slots
            .checked_sub(1)
            .expect("exits cannot outnumber entries");
    }
}

impl<K> Default for CoreOccupancy<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a slot registered with a [`CoreOccupancy`] while alive.
#[derive(Debug)]
pub struct OccupancyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a CoreOccupancy<K>,
    core: K,
}

impl<K> Drop for OccupancyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.owner.exit(&self.core);
    }
}
