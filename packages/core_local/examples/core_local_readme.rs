//! Basic usage: fire-and-forget jobs plus one job with results.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use core_local::{Job, ThreadPool};

fn main() {
    let pool = ThreadPool::new();
    let threads = pool.threads_per_core().get();

    println!(
        "pool uses {} of {} physical cores with {threads} threads each",
        pool.core_count(),
        pool.physical_core_count()
    );

    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        pool.add(Job::from_fn(threads, |_| {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }))
        .unwrap();
    }

    let sums = pool
        .add_with_results((0..threads).map(|slot_index| move || (0..=slot_index).sum::<usize>()))
        .unwrap();

    println!("per-slot sums: {:?}", sums.join().unwrap());

    pool.close(true);

    assert_eq!(counter.load(Ordering::Relaxed), 10 * threads);
}
