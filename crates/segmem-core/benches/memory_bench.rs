//! Criterion benchmarks for segmem-core
//!
//! Measures the hot read/write fan-out paths of the object-state planes.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use segmem_core::{AllocSite, Context, KValue, MemoryObject, ObjectState};
use segmem_expr::{Array, Expr, UpdateList};

fn test_object(size: u64) -> Rc<MemoryObject> {
    Rc::new(MemoryObject::new(
        1,
        0,
        &Expr::constant(size, 64),
        true,
        false,
        false,
        AllocSite::UNKNOWN,
        Context::default(),
    ))
}

/// Sequential concrete word writes followed by a full re-read.
fn bench_concrete_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("concrete_roundtrip");

    for size in [64usize, 256, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut state = ObjectState::new(test_object(size as u64));
                for offset in (0..size).step_by(8) {
                    let value = KValue::constant(offset as u64, 64);
                    state.write(black_box(offset), &value).unwrap();
                }
                for offset in (0..size).step_by(8) {
                    black_box(state.read(offset, 64));
                }
            })
        });
    }

    group.finish();
}

/// Pointer stores exercise both planes: segment materialization plus the
/// dual fan-out.
fn bench_pointer_stores(c: &mut Criterion) {
    let mut group = c.benchmark_group("pointer_stores");

    for size in [64usize, 256] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let pointee = test_object(16);
            b.iter(|| {
                let mut state = ObjectState::new(test_object(size as u64));
                for offset in (0..size).step_by(8) {
                    state.write(black_box(offset), &pointee.pointer_at(8)).unwrap();
                }
            })
        });
    }

    group.finish();
}

/// Cost of the first symbolic-index write: a full flush of precisely-known
/// bytes into the update list.
fn bench_flush_for_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_for_write");

    for size in [64usize, 256, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let index = {
                let byte = Expr::read(
                    &UpdateList::new(Array::new("i", 1)),
                    &Expr::constant(0, 32),
                );
                Expr::zext(&byte, 64)
            };
            b.iter(|| {
                let mut state = ObjectState::new(test_object(size as u64));
                for offset in 0..size {
                    state.write(offset, &KValue::constant(offset as u64 & 0xff, 8)).unwrap();
                }
                state.write_symbolic(black_box(&index), &KValue::constant(0x7f, 8)).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_concrete_roundtrip, bench_pointer_stores, bench_flush_for_write);
criterion_main!(benches);
