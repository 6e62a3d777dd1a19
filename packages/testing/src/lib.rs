#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the core-local thread pool packages.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

mod core_occupancy;

pub use core_occupancy::*;

/// Runs a test on a separate thread and fails it if it takes too long.
///
/// Thread pool tests tend to fail by hanging forever instead of panicking. The watchdog turns a
/// hang into a test failure so CI does not stall.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so that mutation testing can detect hanging mutants.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. A panic in the test itself is resumed on the calling
/// thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::Builder::new()
        .name("watchdog-test".to_string())
        .spawn(move || {
            // If this fails, the watchdog has already given up on us.
            drop(tx.send(test_fn()));
        })
        .expect("test thread must be spawned to run the test");

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread already produced its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the {timeout:?} watchdog timeout, probably a deadlock");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}
