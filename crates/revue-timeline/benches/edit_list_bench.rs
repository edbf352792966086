//! Benchmarks for edit list lookups.
//!
//! Run with: cargo bench -p revue-timeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use revue_core::{FrameRate, MediaId, RationalTime, TimeSourceMode};
use revue_timeline::{EditList, EditListSection};

fn build_list(sections: usize) -> EditList {
    EditList::from_sections((0..sections).map(|i| {
        let rate = if i % 2 == 0 { FrameRate::FPS_24 } else { FrameRate::FPS_48 };
        EditListSection::new(MediaId::new(), 1001, 20 + (i as i64 % 50), rate)
    }))
}

fn bench_media_frame(c: &mut Criterion) {
    let list = build_list(500);
    let total = list.duration_frames(TimeSourceMode::Fixed, FrameRate::FPS_24);

    c.bench_function("media_frame_500_sections", |bencher| {
        let mut frame = 0;
        bencher.iter(|| {
            frame = (frame + 7919) % total;
            black_box(list.media_frame(black_box(frame)).is_ok())
        });
    });
}

fn bench_time_conversion(c: &mut Criterion) {
    let list = build_list(500);
    let time = RationalTime::new(600, 1);

    c.bench_function("logical_frame_dynamic_500_sections", |bencher| {
        bencher.iter(|| {
            list.logical_frame(
                TimeSourceMode::Dynamic,
                black_box(time),
                FrameRate::FPS_24,
            )
        });
    });

    c.bench_function("time_from_frame_dynamic_500_sections", |bencher| {
        bencher.iter(|| list.time_from_frame(TimeSourceMode::Dynamic, black_box(12_000), FrameRate::FPS_24));
    });
}

criterion_group!(benches, bench_media_frame, bench_time_conversion);
criterion_main!(benches);
