//! Basic benchmarks for the `scoped_array` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use scoped_array::{Array, Scope, create_scoped_array};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = u64;
const TEST_VALUE: TestItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("scoped_array_basic");

    let allocs_op = allocs.operation("append_within_capacity");
    group.bench_function("append_within_capacity", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(|| {
                let mut array = Array::<TestItem>::new();
                array.append(TEST_VALUE).unwrap();
                array
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for array in &mut arrays {
                _ = black_box(array.append(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("append_with_growth");
    group.bench_function("append_with_growth", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(Array::<TestItem>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for array in &mut arrays {
                _ = black_box(array.append(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("fill_1000");
    group.bench_function("fill_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut array = Array::<TestItem>::new();

                for value in 0..1000 {
                    _ = black_box(array.append(value));
                }

                drop(black_box(array));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("sort_1000");
    group.bench_function("sort_1000", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(|| {
                let mut array = Array::<TestItem>::new();

                // Deterministic but scrambled input.
                for value in 0..1000_u64 {
                    array.append(value.wrapping_mul(2_654_435_761) % 1000).unwrap();
                }

                array
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for array in &mut arrays {
                array.sort();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("scoped_create_and_teardown");
    group.bench_function("scoped_create_and_teardown", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let scope = Scope::new();
                let array = create_scoped_array(&scope).unwrap();

                // SAFETY: Every append on this array uses the size of TestItem.
                let slot = unsafe { array.append(size_of::<TestItem>()) }.unwrap();

                // SAFETY: The slot is valid for writes of one TestItem and suitably aligned.
                unsafe {
                    slot.cast::<TestItem>().write(TEST_VALUE);
                }

                drop(black_box(scope));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
