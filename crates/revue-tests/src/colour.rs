//! Integration tests for colour data computation.
//!
//! Frames come from a resolved timeline; colour data is fetched through the
//! coordinator with the shared cache attached.

use revue_color::{
    BackendInit, ColourBackend, ColourCache, ColourCacheActor, ColourCacheHandle,
    ColourCoordinatorHandle, ColourPipelineCoordinator, SharedBackend, StaticBackendRegistry,
};
use revue_color::{BuiltinBackend, ColourError};
use revue_core::{
    ColourConfig, FrameDescriptor, FrameRate, MediaId, MediaType, SharedFrameDescriptor,
    TimeSourceMode, TimelineConfig,
};
use revue_timeline::{EditListActor, MediaSource, SyntheticSource};
use std::sync::Arc;
use tokio::sync::watch;

// ── Helpers ────────────────────────────────────────────────────

struct Rig {
    backend: Arc<BuiltinBackend>,
    registry: Arc<StaticBackendRegistry>,
    cache: ColourCacheHandle,
    coordinator: ColourCoordinatorHandle,
}

async fn rig(preferred: &str) -> Rig {
    let backend = Arc::new(BuiltinBackend::new().with_lut_size(64));
    let registry = Arc::new(StaticBackendRegistry::new());
    let shared = Arc::clone(&backend);
    registry.register("builtin", move |_: &BackendInit| {
        Ok(Arc::clone(&shared) as SharedBackend)
    });

    let cache = ColourCacheActor::spawn(128, 64 << 20);
    let config = ColourConfig {
        default_pipeline: preferred.into(),
        worker_count: 2,
        thumbnail_worker_count: 1,
        ..ColourConfig::default()
    };
    let (_tx, rx) = watch::channel(config);
    let coordinator = ColourPipelineCoordinator::spawn(
        registry.clone(),
        Some(Arc::new(cache.clone()) as Arc<dyn ColourCache>),
        rx,
    )
    .await;

    Rig {
        backend,
        registry,
        cache,
        coordinator,
    }
}

fn descriptor(content: &str, exposure: &str) -> SharedFrameDescriptor {
    let mut frame = FrameDescriptor {
        source_id: MediaId::new(),
        content_id: content.into(),
        ..FrameDescriptor::blank(MediaType::Image)
    };
    frame.colour_params.insert("exposure", exposure);
    Arc::new(frame)
}

async fn wait_for_entries(cache: &ColourCacheHandle, count: usize) {
    while cache.count().await.unwrap() < count {
        tokio::task::yield_now().await;
    }
}

// ── Cache-through ──────────────────────────────────────────────

#[tokio::test]
async fn test_identical_content_hits_warm_cache() {
    let rig = rig("builtin").await;
    let pipeline = rig.coordinator.pipeline("viewport1", None).await.unwrap();

    pipeline.colour_data(descriptor("plate", "0")).await.unwrap();
    wait_for_entries(&rig.cache, 1).await;
    let before = rig.backend.stats();

    let a = pipeline.colour_data(descriptor("plate", "0")).await.unwrap();
    let b = pipeline.colour_data(descriptor("plate", "0")).await.unwrap();
    let after = rig.backend.stats();

    assert_eq!(after.setup_calls - before.setup_calls, 0);
    assert_eq!(after.uniform_calls - before.uniform_calls, 2);
    assert_eq!(a.cache_id, b.cache_id);
    assert_ne!(a.uniforms["source_id"], b.uniforms["source_id"]);
}

#[tokio::test]
async fn test_miss_then_hit() {
    let rig = rig("builtin").await;
    let pipeline = rig.coordinator.pipeline("viewport1", None).await.unwrap();
    let frame = descriptor("plate", "1");
    let key = rig
        .backend
        .compute_hash(&frame.content_id, &frame.colour_params);

    assert!(rig.cache.get(&key).await.is_none());
    pipeline.colour_data(Arc::clone(&frame)).await.unwrap();
    assert_eq!(rig.backend.stats().setup_calls, 1);
    wait_for_entries(&rig.cache, 1).await;
    assert_eq!(rig.cache.keys().await.unwrap(), vec![key]);

    pipeline.colour_data(frame).await.unwrap();
    let stats = rig.backend.stats();
    assert_eq!(stats.setup_calls, 1);
    assert_eq!(stats.uniform_calls, 2);
}

#[tokio::test]
async fn test_different_parameters_miss() {
    let rig = rig("builtin").await;
    let pipeline = rig.coordinator.pipeline("viewport1", None).await.unwrap();
    pipeline.colour_data(descriptor("plate", "0")).await.unwrap();
    pipeline.colour_data(descriptor("plate", "1")).await.unwrap();
    pipeline.colour_data(descriptor("other", "0")).await.unwrap();
    assert_eq!(rig.backend.stats().setup_calls, 3);
}

// ── Timeline prefetch ──────────────────────────────────────────

#[tokio::test]
async fn test_prefetch_resolved_timeline() {
    let rig = rig("builtin").await;
    let sources: Vec<Arc<dyn MediaSource>> = vec![
        Arc::new(SyntheticSource::builder("a").frames(6).content_id("plate_a").build()),
        Arc::new(
            SyntheticSource::builder("b")
                .frames(4)
                .content_id("plate_b")
                .colour_param("transfer", "rec709")
                .build(),
        ),
    ];
    let timeline =
        EditListActor::spawn("prefetch", sources, MediaType::Image, TimelineConfig::default())
            .await;
    let map = timeline
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, FrameRate::FPS_24)
        .await
        .unwrap();
    let frames = map.frames_and_times();
    assert_eq!(frames.len(), 10);

    let pipeline = rig.coordinator.pipeline("viewport1", None).await.unwrap();
    let batch = frames.iter().map(|(t, f)| (Arc::clone(f), *t)).collect();
    let colour = pipeline.colour_data_batch(batch).await.unwrap();

    assert_eq!(colour.len(), 10);
    for ((time, data), (expected, frame)) in colour.iter().zip(&frames) {
        assert_eq!(time, expected);
        assert_eq!(
            data.uniforms["logical_frame"],
            frame.playhead_logical_frame.unwrap()
        );
    }
    // one computation per distinct clip
    assert_eq!(rig.backend.stats().setup_calls, 2);
    assert_eq!(rig.backend.stats().uniform_calls, 10);
}

// ── Backend selection ──────────────────────────────────────────

#[tokio::test]
async fn test_missing_preferred_backend_falls_back_once() {
    let rig = rig("ocio").await;
    for viewport in ["viewport1", "viewport2", "viewport1"] {
        let pipeline = rig.coordinator.pipeline(viewport, None).await.unwrap();
        assert_eq!(pipeline.backend_name(), "builtin");
    }
    assert_eq!(
        rig.coordinator.preferred_backend().await.unwrap(),
        "builtin"
    );
    assert_eq!(
        rig.registry.attempts(),
        vec!["builtin".to_string(), "builtin".to_string()]
    );
}

#[tokio::test]
async fn test_broken_preferred_backend_falls_back_once() {
    let rig = rig("ocio").await;
    rig.registry.register("ocio", |_: &BackendInit| {
        Err(ColourError::Instantiation {
            name: "ocio".into(),
            reason: "no config".into(),
        })
    });
    // restart so the coordinator sees "ocio" as available
    let (_tx, rx) = watch::channel(ColourConfig {
        default_pipeline: "ocio".into(),
        ..ColourConfig::default()
    });
    let coordinator = ColourPipelineCoordinator::spawn(rig.registry.clone(), None, rx).await;

    coordinator.pipeline("viewport1", None).await.unwrap();
    coordinator.pipeline("viewport2", None).await.unwrap();
    let attempts = rig.registry.attempts();
    assert_eq!(attempts.iter().filter(|name| *name == "ocio").count(), 1);
    assert_eq!(attempts.len(), 3);
}

#[tokio::test]
async fn test_thumbnail_via_coordinator() {
    let rig = rig("builtin").await;
    let frame = descriptor("plate", "0");
    let thumb = rig
        .coordinator
        .process_thumbnail(frame, revue_color::ThumbnailBuffer::filled(4, 2, [0.5; 3]))
        .await
        .unwrap();
    assert_eq!((thumb.width(), thumb.height()), (4, 2));
    for px in thumb.pixels() {
        assert!((px[0] - 0.5).abs() < 0.05);
    }
    assert_eq!(rig.backend.stats().thumbnail_calls, 1);
    assert_eq!(rig.cache.count().await.unwrap(), 0);
}
