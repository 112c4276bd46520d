//! Allocator benchmarks
//!
//! Compares the heap allocator against the instrumented one, and measures the
//! object-level helpers on top of them.

#![allow(unsafe_code)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nebula_allocator::allocator::{
    Allocator, AllocatorExt, NewDeleteAllocator, TestAllocator, TestAllocatorConfig,
};
use nebula_allocator::stack::Stack;
use std::hint::black_box;

/// Benchmark single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    for size in [16_usize, 64, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("new_delete", size), &size, |b, &size| {
            let allocator = NewDeleteAllocator::singleton();
            b.iter(|| unsafe {
                let address = allocator.allocate(size).unwrap();
                allocator.deallocate(black_box(address));
            });
        });

        group.bench_with_input(BenchmarkId::new("test_allocator", size), &size, |b, &size| {
            let allocator = TestAllocator::with_config(TestAllocatorConfig::quiet());
            b.iter(|| unsafe {
                let address = allocator.allocate(size).unwrap();
                allocator.deallocate(black_box(address));
            });
        });

        group.bench_with_input(BenchmarkId::new("dyn_new_delete", size), &size, |b, &size| {
            let allocator: &dyn Allocator = NewDeleteAllocator::singleton();
            b.iter(|| unsafe {
                let address = allocator.allocate(size).unwrap();
                allocator.deallocate(black_box(address));
            });
        });
    }

    group.finish();
}

/// Benchmark construct + destroy through the lifetime helpers
fn bench_object_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_lifecycle");

    group.bench_function("new_object_destroy", |b| {
        let allocator = NewDeleteAllocator::singleton();
        b.iter(|| unsafe {
            let object = allocator.new_object(black_box([7_u64; 8])).unwrap();
            allocator.destroy_and_deallocate(object);
        });
    });

    group.bench_function("new_object_destroy_raw", |b| {
        let allocator = NewDeleteAllocator::singleton();
        b.iter(|| unsafe {
            let object = allocator.new_object(black_box([7_u64; 8])).unwrap();
            allocator.destroy_and_deallocate_raw(object);
        });
    });

    group.bench_function("box_baseline", |b| {
        b.iter(|| drop(black_box(Box::new([7_u64; 8]))));
    });

    group.finish();
}

/// Benchmark stack growth
fn bench_stack_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_push");

    for count in [16_usize, 256, 4096] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let allocator = NewDeleteAllocator::singleton();
            b.iter(|| {
                let mut stack = Stack::new_in(Some(allocator));
                for value in 0..count {
                    stack.push(value).unwrap();
                }
                black_box(stack.len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_object_lifecycle,
    bench_stack_push
);
criterion_main!(benches);
