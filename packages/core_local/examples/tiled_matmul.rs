//! Multiplies two square matrices tile by tile, running each tile on the threads of one physical
//! core so the rows of B it reads stay in that core's caches.
//!
//! Run with `RUST_LOG=core_local=trace` to see the pool at work.

#![allow(
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::indexing_slicing,
    reason = "example code, sizes are small and fixed"
)]

use std::sync::Arc;
use std::time::Instant;

use core_local::ThreadPool;
use tracing_subscriber::EnvFilter;

const SIZE: usize = 256;
const TILE_ROWS: usize = 16;

type Matrix = Vec<Vec<f64>>;

fn generate(seed: usize) -> Matrix {
    (0..SIZE)
        .map(|row| {
            (0..SIZE)
                .map(|col| ((row * 31 + col * 17 + seed) % 97) as f64 / 97.0)
                .collect()
        })
        .collect()
}

fn transpose(m: &Matrix) -> Matrix {
    (0..SIZE)
        .map(|col| (0..SIZE).map(|row| m[row][col]).collect())
        .collect()
}

/// Row `row` of A times B, with B given as its transpose so both are read row by row.
fn multiply_row(a: &Matrix, b_transposed: &Matrix, row: usize) -> Vec<f64> {
    b_transposed
        .iter()
        .map(|b_col| a[row].iter().zip(b_col).map(|(x, y)| x * y).sum())
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let a = Arc::new(generate(1));
    let b_transposed = Arc::new(transpose(&generate(2)));

    let pool = ThreadPool::builder().thread_name_prefix("matmul").build();
    let threads = pool.threads_per_core().get();

    println!(
        "multiplying {SIZE}x{SIZE} matrices on {} cores with {threads} threads per core",
        pool.core_count()
    );

    let start = Instant::now();

    // One job per tile of rows. Slot `i` of a job computes every `threads`-th row of the tile,
    // starting from row `i`.
    let handles = (0..SIZE)
        .step_by(TILE_ROWS)
        .map(|tile_start| {
            pool.add_with_results((0..threads).map(|slot_index| {
                let a = Arc::clone(&a);
                let b_transposed = Arc::clone(&b_transposed);
                move || {
                    (tile_start + slot_index..tile_start + TILE_ROWS)
                        .step_by(threads)
                        .map(|row| (row, multiply_row(&a, &b_transposed, row)))
                        .collect::<Vec<_>>()
                }
            }))
            .unwrap()
        })
        .collect::<Vec<_>>();

    let mut product = vec![Vec::new(); SIZE];

    for handle in handles {
        for (row, values) in handle.join().unwrap().into_iter().flatten() {
            product[row] = values;
        }
    }

    let elapsed = start.elapsed();
    pool.close(true);

    let expected = (0..SIZE)
        .map(|row| multiply_row(&a, &b_transposed, row))
        .collect::<Matrix>();

    assert_eq!(product, expected);

    println!("done in {elapsed:?}, result verified against a single-threaded multiplication");
}
