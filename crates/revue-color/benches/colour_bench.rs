//! Benchmarks for colour key derivation and pipeline setup.
//!
//! Run with: cargo bench -p revue-color

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use revue_color::{BuiltinBackend, ColourBackend, ThumbnailBuffer};
use revue_core::{ColourParams, FrameDescriptor, MediaType};

fn params() -> ColourParams {
    ColourParams::new()
        .with("transfer", "rec709")
        .with("display", "srgb")
        .with("exposure", "0.5")
}

fn bench_compute_hash(c: &mut Criterion) {
    let backend = BuiltinBackend::new();
    let params = params();
    c.bench_function("builtin_compute_hash", |bencher| {
        bencher.iter(|| backend.compute_hash(black_box("plate_v001"), black_box(&params)))
    });
}

fn bench_setup(c: &mut Criterion) {
    let backend = BuiltinBackend::new();
    let params = params();
    c.bench_function("builtin_setup_1024_lut", |bencher| {
        bencher.iter(|| {
            let mut data = backend.make_empty_data();
            backend.setup(&mut data, "plate_v001", &params).is_ok()
        })
    });
}

fn bench_thumbnail(c: &mut Criterion) {
    let backend = BuiltinBackend::new();
    let frame = FrameDescriptor {
        content_id: "plate_v001".into(),
        colour_params: params(),
        ..FrameDescriptor::blank(MediaType::Image)
    };
    c.bench_function("builtin_thumbnail_128x72", |bencher| {
        bencher.iter(|| {
            let buffer = ThumbnailBuffer::filled(128, 72, [0.18, 0.18, 0.18]);
            backend.process_thumbnail(&frame, black_box(buffer)).is_ok()
        })
    });
}

criterion_group!(benches, bench_compute_hash, bench_setup, bench_thumbnail);
criterion_main!(benches);
