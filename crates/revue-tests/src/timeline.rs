//! Integration tests for timeline resolution.
//!
//! Exercises revue-core and revue-timeline together, with sources running
//! behind their own resolver tasks the way the driver wires them.

use revue_core::{
    FrameRate, MediaId, MediaType, RationalTime, RevueError, TimeSourceMode, TimelineConfig,
};
use revue_timeline::{
    EditListActor, EditListHandle, MediaSource, SourceResolver, SyntheticSource,
    SyntheticSourceBuilder,
};
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────

const RATE: FrameRate = FrameRate::FPS_24;

fn resolved(builder: SyntheticSourceBuilder) -> (MediaId, Arc<dyn MediaSource>) {
    let source = builder.build();
    let id = source.id();
    let name = source.name().to_string();
    (id, Arc::new(SourceResolver::spawn(name, source)))
}

async fn timeline(builders: Vec<SyntheticSourceBuilder>) -> (EditListHandle, Vec<MediaId>) {
    let (ids, sources): (Vec<_>, Vec<_>) = builders.into_iter().map(resolved).unzip();
    let handle =
        EditListActor::spawn("integration", sources, MediaType::Image, TimelineConfig::default())
            .await;
    (handle, ids)
}

fn clips(frames: &[i64]) -> Vec<SyntheticSourceBuilder> {
    frames
        .iter()
        .enumerate()
        .map(|(i, n)| {
            SyntheticSource::builder(format!("clip{}", i))
                .frames(*n)
                .start(100 * i as i64)
        })
        .collect()
}

// ── Resolution ─────────────────────────────────────────────────

#[tokio::test]
async fn test_three_sections_full_map_has_terminator() {
    let (handle, ids) = timeline(clips(&[10, 5, 8])).await;

    let map = handle
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, RATE)
        .await
        .unwrap();
    assert_eq!(map.len(), 24);
    assert_eq!(map.frame_count(), 23);
    assert_eq!(map.end_time(), Some(RationalTime::from_frames(23, RATE)));

    let positions: Vec<i64> = map
        .frames_and_times()
        .iter()
        .map(|(_, f)| f.playhead_logical_frame.unwrap())
        .collect();
    assert_eq!(positions, (0..23).collect::<Vec<_>>());

    let last = map.frame_at(RationalTime::from_frames(22, RATE)).unwrap();
    assert_eq!(last.source_id, ids[2]);
}

#[tokio::test]
async fn test_logical_frame_twelve() {
    let (handle, ids) = timeline(clips(&[10, 5, 8])).await;

    let list = handle.edit_list().await.unwrap();
    let (index, section, local) = list.media_frame(12).unwrap();
    assert_eq!(index, 1);
    assert_eq!(section.media_id, ids[1]);
    assert_eq!(local, 100 + 2);

    let frame = handle.media_pointer(MediaType::Image, 12).await.unwrap();
    assert_eq!(frame.source_id, ids[1]);
    assert_eq!(frame.frame, 100 + 2);
}

#[tokio::test]
async fn test_every_frame_reconstructs_section_boundaries() {
    let sizes = [3, 7, 1, 12, 4];
    let (handle, ids) = timeline(clips(&sizes)).await;

    let mut logical = 0;
    for (i, size) in sizes.iter().enumerate() {
        for offset in 0..*size {
            let frame = handle.media_pointer(MediaType::Image, logical).await.unwrap();
            assert_eq!(frame.source_id, ids[i]);
            assert_eq!(frame.frame, 100 * i as i64 + offset);
            logical += 1;
        }
    }
    assert!(handle
        .media_pointer(MediaType::Image, logical)
        .await
        .unwrap_err()
        .is_no_frames_left());
}

// ── Degraded sources ───────────────────────────────────────────

#[tokio::test]
async fn test_failing_source_yields_flagged_blanks() {
    let mut builders = clips(&[10, 5, 8]);
    builders[1] = SyntheticSource::builder("broken")
        .frames(5)
        .failing("disk offline");
    let (handle, ids) = timeline(builders).await;

    let map = handle
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, RATE)
        .await
        .unwrap();
    assert_eq!(map.len(), 24);

    for n in 10..15 {
        let frame = map.frame_at(RationalTime::from_frames(n, RATE)).unwrap();
        assert!(frame.is_blank());
        assert!(frame.error.as_deref().unwrap().contains("disk offline"));
    }
    let after = map.frame_at(RationalTime::from_frames(15, RATE)).unwrap();
    assert_eq!(after.source_id, ids[2]);
    assert!(!after.has_error());

    // a point query on the broken section reports the failure
    let err = handle.media_pointer(MediaType::Image, 11).await.unwrap_err();
    assert!(matches!(err, RevueError::Source(_)));
}

#[tokio::test]
async fn test_short_batch_is_a_contract_error() {
    let mut builders = clips(&[4, 4]);
    builders[1] = SyntheticSource::builder("short").frames(4).short_batches();
    let (handle, _) = timeline(builders).await;

    let err = handle
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, RATE)
        .await
        .unwrap_err();
    assert!(matches!(err, RevueError::BatchMismatch { expected: 4, got: 3 }));
}

#[tokio::test]
async fn test_removed_source_resolves_blank() {
    let (handle, ids) = timeline(clips(&[10, 5, 8])).await;
    assert!(handle.remove_source(ids[0]).await.unwrap());

    let frame = handle.media_pointer(MediaType::Image, 3).await.unwrap();
    assert!(frame.is_blank());
    assert!(!frame.has_error());

    let map = handle
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, RATE)
        .await
        .unwrap();
    assert_eq!(map.len(), 24);
}

#[tokio::test]
async fn test_audio_only_clip_plays_as_black() {
    let mut builders = clips(&[4, 3]);
    builders.insert(
        1,
        SyntheticSource::builder("music")
            .frames(5)
            .media_types([MediaType::Audio]),
    );
    let (handle, ids) = timeline(builders).await;

    let map = handle
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, RATE)
        .await
        .unwrap();
    assert_eq!(map.frame_count(), 12);
    for n in 4..9 {
        let frame = map.frame_at(RationalTime::from_frames(n, RATE)).unwrap();
        assert!(frame.is_blank());
        assert!(!frame.has_error());
    }
    let after = map.frame_at(RationalTime::from_frames(9, RATE)).unwrap();
    assert_eq!(after.source_id, ids[2]);
}

// ── Navigation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_skip_past_end_on_single_source() {
    let (handle, ids) = timeline(clips(&[10])).await;
    assert_eq!(handle.skip_through_sources(5, 0).await.unwrap(), ids[0]);
    assert_eq!(handle.skip_through_sources(-5, 9).await.unwrap(), ids[0]);
    assert_eq!(handle.skip_through_sources(1, 50).await.unwrap(), ids[0]);
}

#[tokio::test]
async fn test_skip_moves_by_whole_sections() {
    let (handle, ids) = timeline(clips(&[10, 5, 8])).await;
    assert_eq!(handle.skip_through_sources(1, 3).await.unwrap(), ids[1]);
    assert_eq!(handle.skip_through_sources(2, 3).await.unwrap(), ids[2]);
    assert_eq!(handle.skip_through_sources(-1, 20).await.unwrap(), ids[1]);
}

#[tokio::test]
async fn test_mixed_rates_in_dynamic_mode() {
    let builders = vec![
        SyntheticSource::builder("a").frames(24).rate(FrameRate::FPS_24),
        SyntheticSource::builder("b").frames(48).rate(FrameRate::FPS_48),
    ];
    let (handle, _) = timeline(builders).await;

    let fixed = handle.duration_time(TimeSourceMode::Fixed, RATE).await.unwrap();
    let dynamic = handle.duration_time(TimeSourceMode::Dynamic, RATE).await.unwrap();
    assert_eq!(fixed, RationalTime::new(72, 24));
    assert_eq!(dynamic, RationalTime::new(2, 1));

    let t = handle
        .time_from_logical_frame(24 + 12, TimeSourceMode::Dynamic, RATE)
        .await
        .unwrap();
    assert_eq!(t, RationalTime::new(5, 4));
    assert_eq!(handle.rate_at_frame(30).await.unwrap(), FrameRate::FPS_48);
}
