//! GC collection benchmarks
//!
//! Allocation followed by collection, collection with varying
//! survivor ratios, and allocation into recycled slots.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rebind::eval::{
    machine::metrics::{Clock, ThreadOccupation},
    memory::{
        cell::Cell,
        collect::collect,
        flavor::Flavor,
        heap::Heap,
        stub::{Flex, StubId},
        symbol::SymbolTable,
    },
};
use std::hint::black_box;

/// Allocate n managed blocks, each holding a few integers
fn allocate_blocks(heap: &mut Heap, n: usize) -> Vec<StubId> {
    (0..n)
        .map(|i| {
            let cells = vec![Cell::integer(i as i64); 4];
            let id = heap.alloc_flex(Flavor::Source, Flex::Cells(cells)).unwrap();
            heap.manage(id).unwrap();
            id
        })
        .collect()
}

/// Benchmark: allocate blocks then collect with no survivors
fn bench_alloc_then_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_alloc_then_collect");

    for count in [256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut heap = Heap::new();
                let mut symbols = SymbolTable::new();
                let mut clock = Clock::default();
                clock.switch(ThreadOccupation::Mutator);

                let _ids = allocate_blocks(&mut heap, count);

                let roots: Vec<StubId> = vec![];
                collect(black_box(&roots), &mut heap, &mut symbols, &mut clock, false).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark: collect with varying percentage of survivors
fn bench_collect_with_survivors(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_collect_with_survivors");

    let total = 1024;
    for survivor_pct in [0, 25, 50, 75, 100] {
        group.bench_with_input(
            BenchmarkId::new("pct", survivor_pct),
            &survivor_pct,
            |b, &pct| {
                b.iter(|| {
                    let mut heap = Heap::new();
                    let mut symbols = SymbolTable::new();
                    let mut clock = Clock::default();
                    clock.switch(ThreadOccupation::Mutator);

                    let ids = allocate_blocks(&mut heap, total);
                    let roots: Vec<StubId> = ids.into_iter().take(total * pct / 100).collect();

                    collect(black_box(&roots), &mut heap, &mut symbols, &mut clock, false)
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: a chain of blocks each referencing the next
fn bench_collect_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_collect_chain");

    for length in [256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            b.iter(|| {
                let mut heap = Heap::new();
                let mut symbols = SymbolTable::new();
                let mut clock = Clock::default();

                let ids = allocate_blocks(&mut heap, length);
                for pair in ids.windows(2) {
                    heap.push_cell(pair[0], Cell::block(pair[1])).unwrap();
                }
                let roots = vec![ids[0]];
                collect(black_box(&roots), &mut heap, &mut symbols, &mut clock, false).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark: allocate, collect, then allocate into recycled slots
fn bench_alloc_into_recycled(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_alloc_into_recycled");

    for count in [256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut heap = Heap::new();
                let mut symbols = SymbolTable::new();
                let mut clock = Clock::default();
                clock.switch(ThreadOccupation::Mutator);

                let _ids = allocate_blocks(&mut heap, count);
                let roots: Vec<StubId> = vec![];
                collect(&roots, &mut heap, &mut symbols, &mut clock, false).unwrap();

                clock.switch(ThreadOccupation::Mutator);
                let _fresh = allocate_blocks(&mut heap, black_box(count));
            });
        });
    }
    group.finish();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    bench_alloc_then_collect(c);
    bench_collect_with_survivors(c);
    bench_collect_chain(c);
    bench_alloc_into_recycled(c);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
