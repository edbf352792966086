//! Colour pipeline actor.
//!
//! Answers "what colour data does this frame need" with a cache-through
//! lookup. Hits and misses both finish with a per-frame uniform update.
//! Concurrent requests for the same key share one lookup and at most one
//! computation; the expensive setup runs on the interactive worker pool,
//! thumbnails on a separate pool so bulk work cannot starve playback.

use revue_core::{defaults, ColourConfig, RationalTime, SharedFrameDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

use crate::backend::SharedBackend;
use crate::cache::ColourCache;
use crate::data::{SharedColourData, ThumbnailBuffer};
use crate::error::{ColourError, ColourResult};
use crate::pool::WorkerPool;

enum PipelineRequest {
    ColourData {
        frame: SharedFrameDescriptor,
        reply: oneshot::Sender<ColourResult<SharedColourData>>,
    },
    Completed {
        key: String,
        result: ColourResult<SharedColourData>,
    },
    TransformHash {
        frame: SharedFrameDescriptor,
        reply: oneshot::Sender<String>,
    },
    Thumbnail {
        frame: SharedFrameDescriptor,
        buffer: ThumbnailBuffer,
        reply: oneshot::Sender<ColourResult<ThumbnailBuffer>>,
    },
    Shutdown,
}

struct Waiter {
    frame: SharedFrameDescriptor,
    reply: oneshot::Sender<ColourResult<SharedColourData>>,
}

/// Cache-through colour computation for one backend instance.
pub struct ColourPipeline {
    backend: SharedBackend,
    cache: Option<Arc<dyn ColourCache>>,
    pool: Arc<WorkerPool>,
    thumbnail_pool: Arc<WorkerPool>,
    /// Requests waiting on a lookup or computation, by key.
    in_flight: HashMap<String, Vec<Waiter>>,
    mailbox: mpsc::WeakSender<PipelineRequest>,
}

impl ColourPipeline {
    /// Start a pipeline around `backend` with both worker pools sized from
    /// `config`.
    pub fn spawn(
        backend: SharedBackend,
        cache: Option<Arc<dyn ColourCache>>,
        config: &ColourConfig,
    ) -> ColourPipelineHandle {
        let name = backend.name().to_string();
        let pool = Arc::new(WorkerPool::new(
            format!("{}-workers", name),
            config.worker_count,
            SharedBackend::clone(&backend),
            cache.clone(),
        ));
        let thumbnail_pool = Arc::new(WorkerPool::new(
            format!("{}-thumbnails", name),
            config.thumbnail_worker_count,
            SharedBackend::clone(&backend),
            None,
        ));

        let (tx, rx) = mpsc::channel(defaults::MAILBOX_CAPACITY);
        let actor = Self {
            backend,
            cache,
            pool,
            thumbnail_pool,
            in_flight: HashMap::new(),
            mailbox: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));
        info!(backend = %name, "Colour pipeline started");

        ColourPipelineHandle {
            tx,
            name: Arc::from(name),
            timeout: config.request_timeout(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PipelineRequest>) {
        while let Some(request) = rx.recv().await {
            match request {
                PipelineRequest::ColourData { frame, reply } => self.colour_data(frame, reply),
                PipelineRequest::Completed { key, result } => self.completed(key, result),
                PipelineRequest::TransformHash { frame, reply } => {
                    let _ = reply.send(self.key_for(&frame));
                }
                PipelineRequest::Thumbnail {
                    frame,
                    buffer,
                    reply,
                } => {
                    let pool = Arc::clone(&self.thumbnail_pool);
                    tokio::spawn(async move {
                        let _ = reply.send(pool.process_thumbnail(frame, buffer).await);
                    });
                }
                PipelineRequest::Shutdown => break,
            }
        }
        self.pool.shutdown().await;
        self.thumbnail_pool.shutdown().await;
        debug!(backend = self.backend.name(), "Colour pipeline exited");
    }

    fn key_for(&self, frame: &SharedFrameDescriptor) -> String {
        self.backend
            .compute_hash(&frame.content_id, &frame.colour_params)
    }

    fn colour_data(
        &mut self,
        frame: SharedFrameDescriptor,
        reply: oneshot::Sender<ColourResult<SharedColourData>>,
    ) {
        let key = self.key_for(&frame);
        if let Some(waiters) = self.in_flight.get_mut(&key) {
            trace!(key = %key, "Joining in-flight colour request");
            waiters.push(Waiter { frame, reply });
            return;
        }

        let content_id = frame.content_id.clone();
        let params = frame.colour_params.clone();
        self.in_flight
            .insert(key.clone(), vec![Waiter { frame, reply }]);

        let cache = self.cache.clone();
        let pool = Arc::clone(&self.pool);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let cached = match &cache {
                Some(cache) => cache.get(&key).await,
                None => None,
            };
            let result = match cached {
                Some(data) => {
                    trace!(key = %key, "Colour cache hit");
                    Ok(data)
                }
                None => {
                    debug!(key = %key, "Colour cache miss");
                    pool.compute(key.clone(), content_id, params).await
                }
            };
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(PipelineRequest::Completed { key, result })
                    .await;
            }
        });
    }

    fn completed(&mut self, key: String, result: ColourResult<SharedColourData>) {
        let Some(waiters) = self.in_flight.remove(&key) else {
            return;
        };
        for Waiter { frame, reply } in waiters {
            if reply.is_closed() {
                trace!(key = %key, "Colour request abandoned");
                continue;
            }
            let response = result.clone().and_then(|shared| {
                let mut data = (*shared).clone();
                self.backend.update_uniforms(&mut data, &frame)?;
                Ok(Arc::new(data))
            });
            let _ = reply.send(response);
        }
    }
}

/// Cloneable address of a [`ColourPipeline`].
#[derive(Debug, Clone)]
pub struct ColourPipelineHandle {
    tx: mpsc::Sender<PipelineRequest>,
    name: Arc<str>,
    timeout: Option<Duration>,
}

impl ColourPipelineHandle {
    /// Name of the backend behind this pipeline.
    pub fn backend_name(&self) -> &str {
        &self.name
    }

    /// Override the deadline for colour requests. `None` waits
    /// indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once the pipeline has exited.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(PipelineRequest::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PipelineRequest,
    ) -> ColourResult<T> {
        let closed = || ColourError::PoolClosed(self.name.to_string());
        let (reply, response) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| closed())?;
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| ColourError::Timeout(format!("{} after {:?}", self.name, limit)))?
                .map_err(|_| closed()),
            None => response.await.map_err(|_| closed()),
        }
    }

    /// Colour data for one frame.
    pub async fn colour_data(&self, frame: SharedFrameDescriptor) -> ColourResult<SharedColourData> {
        self.request(|reply| PipelineRequest::ColourData { frame, reply })
            .await?
    }

    /// Colour data for a set of upcoming frames, in input order.
    ///
    /// Requests run concurrently. The first failure aborts the batch.
    pub async fn colour_data_batch(
        &self,
        frames: Vec<(SharedFrameDescriptor, RationalTime)>,
    ) -> ColourResult<Vec<(RationalTime, SharedColourData)>> {
        let mut results: Vec<Option<(RationalTime, SharedColourData)>> = vec![None; frames.len()];
        let mut tasks = JoinSet::new();
        for (index, (frame, time)) in frames.into_iter().enumerate() {
            let handle = self.clone();
            tasks.spawn(async move { (index, time, handle.colour_data(frame).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, time, result) =
                joined.map_err(|e| ColourError::Compute(e.to_string()))?;
            results[index] = Some((time, result?));
        }

        results
            .into_iter()
            .map(|slot| slot.ok_or_else(|| ColourError::Compute("missing batch result".into())))
            .collect()
    }

    /// Cache key the backend derives for `frame`.
    pub async fn transform_hash(&self, frame: SharedFrameDescriptor) -> ColourResult<String> {
        self.request(|reply| PipelineRequest::TransformHash { frame, reply })
            .await
    }

    /// Convert a thumbnail for display on the thumbnail pool.
    pub async fn process_thumbnail(
        &self,
        frame: SharedFrameDescriptor,
        buffer: ThumbnailBuffer,
    ) -> ColourResult<ThumbnailBuffer> {
        self.request(|reply| PipelineRequest::Thumbnail {
            frame,
            buffer,
            reply,
        })
        .await?
    }
}
