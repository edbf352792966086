//! Fixed-size colour worker pool.
//!
//! Every worker shares the same backend and cache handle, so any worker can
//! serve any job. Jobs are dispatched round-robin. A worker found dead at
//! dispatch time is replaced in its slot, keeping the pool size fixed.

use parking_lot::Mutex;
use revue_core::{defaults, ColourParams, FrameDescriptor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::backend::SharedBackend;
use crate::cache::ColourCache;
use crate::data::{SharedColourData, ThumbnailBuffer};
use crate::error::{ColourError, ColourResult};

enum WorkerMessage {
    Compute {
        key: String,
        content_id: String,
        params: ColourParams,
        reply: oneshot::Sender<ColourResult<SharedColourData>>,
    },
    Thumbnail {
        frame: Arc<FrameDescriptor>,
        buffer: ThumbnailBuffer,
        reply: oneshot::Sender<ColourResult<ThumbnailBuffer>>,
    },
    Stop,
}

/// Round-robin pool of colour workers.
pub struct WorkerPool {
    name: String,
    backend: SharedBackend,
    cache: Option<Arc<dyn ColourCache>>,
    workers: Mutex<Vec<mpsc::Sender<WorkerMessage>>>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Start `size` workers (at least one).
    pub fn new(
        name: impl Into<String>,
        size: usize,
        backend: SharedBackend,
        cache: Option<Arc<dyn ColourCache>>,
    ) -> Self {
        let name = name.into();
        let size = size.max(1);
        let workers = (0..size)
            .map(|index| spawn_worker(&name, index, SharedBackend::clone(&backend), cache.clone()))
            .collect();
        debug!(pool = %name, size, backend = backend.name(), "Colour worker pool started");
        Self {
            name,
            backend,
            cache,
            workers: Mutex::new(workers),
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Run the expensive setup for `key` on the next worker. The worker
    /// stores the result in the cache before replying.
    pub async fn compute(
        &self,
        key: String,
        content_id: String,
        params: ColourParams,
    ) -> ColourResult<SharedColourData> {
        let (reply, response) = oneshot::channel();
        self.dispatch(WorkerMessage::Compute {
            key,
            content_id,
            params,
            reply,
        })
        .await?;
        response.await.map_err(|_| self.closed_error())?
    }

    pub async fn process_thumbnail(
        &self,
        frame: Arc<FrameDescriptor>,
        buffer: ThumbnailBuffer,
    ) -> ColourResult<ThumbnailBuffer> {
        let (reply, response) = oneshot::channel();
        self.dispatch(WorkerMessage::Thumbnail {
            frame,
            buffer,
            reply,
        })
        .await?;
        response.await.map_err(|_| self.closed_error())?
    }

    /// Stop every worker. Later dispatches fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let workers: Vec<_> = self.workers.lock().clone();
        for worker in workers {
            let _ = worker.send(WorkerMessage::Stop).await;
        }
        debug!(pool = %self.name, "Colour worker pool stopped");
    }

    fn closed_error(&self) -> ColourError {
        ColourError::PoolClosed(self.name.clone())
    }

    fn next_index(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.size()
    }

    /// Sender for slot `index`, replacing the worker if it has exited.
    fn live_worker(&self, index: usize) -> mpsc::Sender<WorkerMessage> {
        let mut workers = self.workers.lock();
        if workers[index].is_closed() {
            warn!(pool = %self.name, worker = index, "Colour worker exited, replacing");
            workers[index] = spawn_worker(
                &self.name,
                index,
                SharedBackend::clone(&self.backend),
                self.cache.clone(),
            );
        }
        workers[index].clone()
    }

    async fn dispatch(&self, message: WorkerMessage) -> ColourResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        let index = self.next_index();
        trace!(pool = %self.name, worker = index, "Dispatching colour job");
        let message = match self.live_worker(index).send(message).await {
            Ok(()) => return Ok(()),
            Err(mpsc::error::SendError(message)) => message,
        };
        // the worker went away between the liveness check and the send
        self.live_worker(index)
            .send(message)
            .await
            .map_err(|_| self.closed_error())
    }

    #[cfg(test)]
    async fn stop_worker(&self, index: usize) {
        let worker = self.workers.lock()[index].clone();
        let _ = worker.send(WorkerMessage::Stop).await;
        worker.closed().await;
    }
}

fn spawn_worker(
    pool: &str,
    index: usize,
    backend: SharedBackend,
    cache: Option<Arc<dyn ColourCache>>,
) -> mpsc::Sender<WorkerMessage> {
    let (tx, mut rx) = mpsc::channel(defaults::MAILBOX_CAPACITY);
    let pool = pool.to_string();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Compute {
                    key,
                    content_id,
                    params,
                    reply,
                } => {
                    let result = compute(SharedBackend::clone(&backend), content_id, params).await;
                    if let (Ok(data), Some(cache)) = (&result, &cache) {
                        cache.put(key, SharedColourData::clone(data));
                    }
                    let _ = reply.send(result);
                }
                WorkerMessage::Thumbnail {
                    frame,
                    buffer,
                    reply,
                } => {
                    let backend = SharedBackend::clone(&backend);
                    let result =
                        tokio::task::spawn_blocking(move || backend.process_thumbnail(&frame, buffer))
                            .await
                            .unwrap_or_else(|e| Err(ColourError::Thumbnail(e.to_string())));
                    let _ = reply.send(result);
                }
                WorkerMessage::Stop => break,
            }
        }
        trace!(pool = %pool, worker = index, "Colour worker exited");
    });

    tx
}

async fn compute(
    backend: SharedBackend,
    content_id: String,
    params: ColourParams,
) -> ColourResult<SharedColourData> {
    tokio::task::spawn_blocking(move || -> ColourResult<SharedColourData> {
        let mut data = backend.make_empty_data();
        backend.setup(&mut data, &content_id, &params)?;
        Ok(Arc::new(data))
    })
    .await
    .unwrap_or_else(|e| Err(ColourError::Compute(e.to_string())))
}
