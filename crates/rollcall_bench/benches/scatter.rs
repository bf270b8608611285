//! Scatter-gather benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rollcall_bench::populated_registry;
use rollcall_core::FanOut;

/// Benchmark batched course lookup for growing student sets.
fn bench_courses_for_students(c: &mut Criterion) {
    let mut group = c.benchmark_group("courses_for_students");

    for fan_out in [FanOut::Sequential, FanOut::Parallel] {
        for count in [2usize, 16, 128, 512] {
            let (registry, students) = populated_registry(count, fan_out);
            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{fan_out:?}"), count),
                &students,
                |b, students| {
                    b.iter(|| black_box(registry.courses_for_students(students).unwrap()));
                },
            );
        }
    }

    group.finish();
}

/// Batched lookup against one point query per student.
fn bench_batch_vs_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_vs_point");
    let (registry, students) = populated_registry(128, FanOut::Parallel);

    group.bench_function("batch", |b| {
        b.iter(|| black_box(registry.courses_for_students(&students).unwrap()));
    });
    group.bench_function("point", |b| {
        b.iter(|| {
            for student in &students {
                black_box(registry.enrollments_for(student).unwrap());
            }
        });
    });

    group.finish();
}

/// Benchmark listing every student across partitions.
fn bench_list_students(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_students");

    for fan_out in [FanOut::Sequential, FanOut::Parallel] {
        let (registry, _) = populated_registry(512, fan_out);
        group.bench_function(format!("{fan_out:?}"), |b| {
            b.iter(|| black_box(registry.list_students().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_courses_for_students,
    bench_batch_vs_point,
    bench_list_students
);
criterion_main!(benches);
