//! Benchmarks for curve evaluation and incremental cache updates.
//!
//! Run with: cargo bench -p keyrig-curve-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keyrig_curve_core::{AnimatableProperty, AnimationSet, Curve, FrameRange, Keyframe};

fn curve_with_keys(count: i32, range: FrameRange) -> Curve {
    let step = (range.end - range.start) / count.max(1);
    let keys = (0..count)
        .map(|i| Keyframe::new(range.start + i * step, ((i * 37) % 11) as f32))
        .collect();
    Curve::from_keys(AnimatableProperty::PositionX, range, keys)
}

fn bench_evaluate(c: &mut Criterion) {
    let range = FrameRange::new(1, 1000).unwrap();
    let mut group = c.benchmark_group("evaluate");
    for keys in [4, 32, 256] {
        let curve = curve_with_keys(keys, range);
        group.bench_with_input(BenchmarkId::new("cached", keys), &curve, |b, curve| {
            b.iter(|| range.frames().filter_map(|f| curve.evaluate(black_box(f))).sum::<f32>())
        });
        group.bench_with_input(BenchmarkId::new("uncached", keys), &curve, |b, curve| {
            b.iter(|| {
                range
                    .frames()
                    .filter_map(|f| curve.evaluate_uncached(black_box(f)))
                    .sum::<f32>()
            })
        });
    }
    group.finish();
}

fn bench_edits(c: &mut Criterion) {
    let range = FrameRange::new(1, 1000).unwrap();
    let curve = curve_with_keys(64, range);
    c.bench_function("add_remove_key", |b| {
        b.iter_batched(
            || curve.clone(),
            |mut curve| {
                curve.add_key(Keyframe::new(black_box(501), 3.0), false);
                curve.remove_key(black_box(501), false);
                curve
            },
            criterion::BatchSize::SmallInput,
        )
    });
    c.bench_function("compute_cache", |b| {
        b.iter_batched(
            || curve.clone(),
            |mut curve| {
                curve.compute_cache();
                curve
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_trs(c: &mut Criterion) {
    let range = FrameRange::new(1, 240).unwrap();
    let mut set = AnimationSet::transform(range);
    for (i, property) in AnimatableProperty::POSITION
        .iter()
        .chain(AnimatableProperty::ROTATION.iter())
        .enumerate()
    {
        set.set_curve(
            *property,
            vec![Keyframe::new(1, 0.0), Keyframe::new(120, 10.0 * i as f32), Keyframe::new(240, 0.0)],
        );
    }
    c.bench_function("trs_matrix", |b| {
        b.iter(|| range.frames().map(|f| set.trs_matrix(black_box(f))[(0, 3)]).sum::<f32>())
    });
}

criterion_group!(benches, bench_evaluate, bench_edits, bench_trs);
criterion_main!(benches);
