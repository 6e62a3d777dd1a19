#![expect(
    missing_docs,
    reason = "This is a test file, documentation is not required."
)]

use std::thread;

use core_topology::{AffinityMask, Topology, TopologyError};
use testing::with_watchdog;

#[cfg_attr(miri, ignore)] // Talks to the real operating system.
#[test]
fn cores_do_not_share_processors() {
    let masks = Topology::current().core_masks().unwrap();

    for (i, a) in masks.iter().enumerate() {
        for b in masks.iter().skip(i + 1) {
            assert!(!a.overlaps(b), "cores {a} and {b} share a logical processor");
        }
    }
}

#[cfg_attr(miri, ignore)] // Talks to the real operating system.
#[test]
fn counts_are_consistent() {
    let topology = Topology::current();

    let cores = topology.physical_core_count().unwrap();
    let processors = topology.logical_processor_count().unwrap();

    assert!(cores >= 1);
    assert!(processors >= cores);
    assert_eq!(
        processors,
        topology
            .core_masks()
            .unwrap()
            .iter()
            .map(AffinityMask::len)
            .sum::<usize>()
    );
}

#[cfg_attr(miri, ignore)] // Talks to the real operating system.
#[test]
fn core_after_last_is_out_of_range() {
    let topology = Topology::current();
    let cores = topology.physical_core_count().unwrap();

    assert!(matches!(
        topology.affinity_mask_for(cores),
        Err(TopologyError::CoreIndexOutOfRange { index, core_count })
            if index == cores && core_count == cores
    ));
}

#[cfg_attr(miri, ignore)] // Talks to the real operating system.
#[test]
fn pinned_thread_reports_its_core() {
    with_watchdog(|| {
        let topology = Topology::current();
        let last_core = topology
            .physical_core_count()
            .unwrap()
            .checked_sub(1)
            .unwrap();
        let mask = topology.affinity_mask_for(last_core).unwrap();

        let observed = thread::spawn({
            let mask = mask.clone();
            move || {
                Topology::current().pin_current_thread_to(&mask).unwrap();
                Topology::current().current_thread_affinity().unwrap()
            }
        })
        .join()
        .unwrap();

        assert_eq!(observed, mask);
    });
}
