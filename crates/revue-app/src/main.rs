//! Revue - headless review driver
//!
//! Builds a small timeline from synthetic sources, resolves it into a
//! frame/time map and prefetches colour data for every frame.
//!
//! Usage: `revue [config.json]`. Log output is controlled by `RUST_LOG`.

use anyhow::{Context, Result};
use revue_color::{
    ColourCache, ColourCacheActor, ColourPipelineCoordinator, StaticBackendRegistry,
    ThumbnailBuffer,
};
use revue_core::{MediaType, RevueConfig, TimeSourceMode};
use revue_timeline::{EditListActor, MediaSource, SourceResolver, SyntheticSource};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn load_config() -> Result<RevueConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            RevueConfig::load(&path).with_context(|| format!("loading config from {}", path))
        }
        None => Ok(RevueConfig::default()),
    }
}

/// Three clips of 10, 5 and 8 frames. The middle one has a colour grade.
fn demo_sources() -> Vec<Arc<dyn MediaSource>> {
    let clips = [
        SyntheticSource::builder("A001_C003").frames(10).start(86400),
        SyntheticSource::builder("A002_C001")
            .frames(5)
            .start(1001)
            .colour_param("transfer", "rec709")
            .colour_param("exposure", "0.5"),
        SyntheticSource::builder("A003_C007").frames(8).start(0),
    ];

    clips
        .into_iter()
        .map(|builder| {
            let source = builder.build();
            let name = source.name().to_string();
            Arc::new(SourceResolver::spawn(name, source)) as Arc<dyn MediaSource>
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Revue starting...");

    let mut config = load_config()?;
    let cores = num_cpus::get();
    config.colour.worker_count = config.colour.worker_count.min(cores);
    config.colour.thumbnail_worker_count = config.colour.thumbnail_worker_count.min(cores);

    // Timeline
    let rate = config.timeline.default_rate;
    let timeline = EditListActor::spawn(
        "demo",
        demo_sources(),
        MediaType::Image,
        config.timeline.clone(),
    )
    .await;
    let map = timeline
        .media_pointers(MediaType::Image, TimeSourceMode::Fixed, rate)
        .await
        .context("resolving timeline")?;
    let frames = map.frames_and_times();
    info!(
        entries = map.len(),
        frames = frames.len(),
        duration = ?map.end_time(),
        "Timeline resolved"
    );

    // Colour
    let cache = ColourCacheActor::spawn(
        config.colour.cache_max_count,
        config.colour.cache_max_size_bytes(),
    );
    let registry = Arc::new(StaticBackendRegistry::with_builtin());
    let (_config_tx, config_rx) = watch::channel(config.colour.clone());
    cache.follow_config(config_rx.clone());
    let coordinator = ColourPipelineCoordinator::spawn(
        registry,
        Some(Arc::new(cache.clone()) as Arc<dyn ColourCache>),
        config_rx,
    )
    .await;

    let pipeline = coordinator
        .pipeline("viewport1", None)
        .await
        .context("starting colour pipeline")?;
    let batch = frames
        .iter()
        .map(|(time, frame)| (Arc::clone(frame), *time))
        .collect();
    let colour = pipeline
        .colour_data_batch(batch)
        .await
        .context("prefetching colour data")?;
    info!(
        backend = pipeline.backend_name(),
        frames = colour.len(),
        cache_entries = cache.count().await?,
        cache_bytes = cache.size_bytes().await?,
        "Colour data prefetched"
    );

    if let Some((_, first)) = frames.first() {
        match coordinator
            .process_thumbnail(Arc::clone(first), ThumbnailBuffer::filled(16, 9, [0.18; 3]))
            .await
        {
            Ok(thumb) => info!(width = thumb.width(), height = thumb.height(), "Thumbnail ready"),
            Err(e) => warn!(error = %e, "Thumbnail failed"),
        }
    }

    coordinator.shutdown().await;
    timeline.shutdown().await;
    cache.shutdown();
    info!("Revue finished");
    Ok(())
}
