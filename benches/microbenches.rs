//! Criterion microbenches for the batch labeling hot paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the per-batch bookkeeping that runs once per
//! detection: class counting, class map derivation, and label line
//! formatting. Inference and file I/O stay outside the timed regions.

use std::hint::black_box;
use std::io::Write;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use autolabel::annotate::{ClassCounts, ClassMap};
use autolabel::detector::{BoxCxcywh, Detection};

/// Deterministic spread of class ids over 50 classes.
fn sample_ids(len: usize) -> Vec<usize> {
    (0..len).map(|i| (i * 31 + 7) % 50).collect()
}

fn sample_detections(len: usize) -> Vec<Detection> {
    sample_ids(len)
        .into_iter()
        .enumerate()
        .map(|(i, class_id)| {
            let t = (i % 997) as f32 / 997.0;
            Detection::new(
                class_id,
                BoxCxcywh::new(t, 1.0 - t, t * 0.5, 0.25),
                0.5 + t * 0.5,
            )
        })
        .collect()
}

/// Benchmark accumulating per-class counts across a batch.
fn bench_class_counting(c: &mut Criterion) {
    let ids = sample_ids(10_000);

    let mut group = c.benchmark_group("class_counts");
    group.throughput(Throughput::Elements(ids.len() as u64));

    group.bench_function("record", |b| {
        b.iter(|| {
            let mut counts = ClassCounts::new();
            for id in &ids {
                counts.record(black_box(*id));
            }
            black_box(counts)
        })
    });

    group.finish();
}

/// Benchmark deriving the contiguous class map from batch counts.
fn bench_class_map_derivation(c: &mut Criterion) {
    let mut counts = ClassCounts::new();
    for id in sample_ids(10_000) {
        counts.record(id);
    }

    let mut group = c.benchmark_group("class_map");
    group.throughput(Throughput::Elements(counts.distinct() as u64));

    group.bench_function("from_counts", |b| {
        b.iter(|| {
            let map = ClassMap::from_counts(black_box(&counts), |id| format!("class_{id}"));
            black_box(map)
        })
    });

    group.finish();
}

/// Benchmark formatting label lines for one large image.
fn bench_label_line_formatting(c: &mut Criterion) {
    let detections = sample_detections(1_000);
    let mut counts = ClassCounts::new();
    for detection in &detections {
        counts.record(detection.class_id);
    }
    let map = ClassMap::from_counts(&counts, |id| format!("class_{id}"));

    let mut group = c.benchmark_group("label_lines");
    group.throughput(Throughput::Elements(detections.len() as u64));

    group.bench_function("format", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(detections.len() * 48);
            for detection in &detections {
                if let Some(bbox) = detection.bbox {
                    let index = map.index_of(detection.class_id).unwrap_or(0);
                    writeln!(
                        buf,
                        "{} {:.6} {:.6} {:.6} {:.6}",
                        index, bbox.cx, bbox.cy, bbox.w, bbox.h
                    )
                    .unwrap();
                }
            }
            black_box(buf)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_class_counting,
    bench_class_map_derivation,
    bench_label_line_formatting,
);
criterion_main!(benches);
