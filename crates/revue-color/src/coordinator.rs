//! Colour pipeline coordinator.
//!
//! Binds viewport identities to running [`ColourPipeline`]s. The first
//! request for a viewport instantiates the preferred backend; if that fails
//! the builtin backend is tried once and becomes the preferred backend from
//! then on. A pipeline that exits is unbound so the next request for its
//! viewport starts a fresh one.

use revue_core::{defaults, ColourConfig, SharedFrameDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::SharedBackend;
use crate::cache::ColourCache;
use crate::data::ThumbnailBuffer;
use crate::error::{ColourError, ColourResult};
use crate::pipeline::{ColourPipeline, ColourPipelineHandle};
use crate::registry::{BackendInit, BackendRegistry};

type PipelineReply = oneshot::Sender<ColourResult<ColourPipelineHandle>>;

enum CoordinatorRequest {
    Pipeline {
        viewport: String,
        window: Option<String>,
        reply: PipelineReply,
    },
    Instantiated {
        viewport: String,
        outcome: Instantiation,
    },
    PreferredBackend(oneshot::Sender<String>),
    BoundViewports(oneshot::Sender<Vec<String>>),
    Shutdown,
}

/// Result of one instantiate-with-fallback sequence.
struct Instantiation {
    result: ColourResult<SharedBackend>,
    /// The preferred backend failed and should no longer be tried.
    demote: bool,
}

enum Slot {
    Attempting(Vec<PipelineReply>),
    Active {
        handle: ColourPipelineHandle,
        generation: u64,
    },
}

/// Owns the viewport to pipeline table.
pub struct ColourPipelineCoordinator {
    registry: Arc<dyn BackendRegistry>,
    cache: Option<Arc<dyn ColourCache>>,
    config: watch::Receiver<ColourConfig>,
    /// Backend tried first for new viewports.
    preferred: String,
    /// Last backend name read from the configuration.
    configured: String,
    slots: HashMap<String, Slot>,
    generation: u64,
    watchers: JoinSet<(String, u64)>,
    mailbox: mpsc::WeakSender<CoordinatorRequest>,
}

impl ColourPipelineCoordinator {
    /// Start the coordinator. The configured backend name is checked against
    /// the registry and replaced by the builtin backend when it is not
    /// available.
    pub async fn spawn(
        registry: Arc<dyn BackendRegistry>,
        cache: Option<Arc<dyn ColourCache>>,
        config: watch::Receiver<ColourConfig>,
    ) -> ColourCoordinatorHandle {
        let (configured, timeout) = {
            let current = config.borrow();
            (current.default_pipeline.clone(), current.request_timeout())
        };
        let preferred = validate(registry.as_ref(), &configured).await;

        let (tx, rx) = mpsc::channel(defaults::MAILBOX_CAPACITY);
        let actor = Self {
            registry,
            cache,
            config,
            preferred,
            configured,
            slots: HashMap::new(),
            generation: 0,
            watchers: JoinSet::new(),
            mailbox: tx.downgrade(),
        };
        info!(preferred = %actor.preferred, "Colour pipeline coordinator started");
        tokio::spawn(actor.run(rx));

        ColourCoordinatorHandle { tx, timeout }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<CoordinatorRequest>) {
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(CoordinatorRequest::Shutdown) | None => break,
                    Some(request) => self.handle(request),
                },
                Some(exited) = self.watchers.join_next(), if !self.watchers.is_empty() => {
                    match exited {
                        Ok((viewport, generation)) => self.on_pipeline_exited(viewport, generation),
                        Err(e) => warn!(error = %e, "Colour pipeline watcher failed"),
                    }
                }
            }
        }

        for slot in self.slots.into_values() {
            if let Slot::Active { handle, .. } = slot {
                handle.shutdown().await;
            }
        }
        debug!("Colour pipeline coordinator exited");
    }

    fn handle(&mut self, request: CoordinatorRequest) {
        match request {
            CoordinatorRequest::Pipeline {
                viewport,
                window,
                reply,
            } => self.pipeline(viewport, window, reply),
            CoordinatorRequest::Instantiated { viewport, outcome } => {
                self.on_instantiated(viewport, outcome)
            }
            CoordinatorRequest::PreferredBackend(reply) => {
                let _ = reply.send(self.preferred.clone());
            }
            CoordinatorRequest::BoundViewports(reply) => {
                let mut bound: Vec<String> = self
                    .slots
                    .iter()
                    .filter(|(_, slot)| matches!(slot, Slot::Active { .. }))
                    .map(|(viewport, _)| viewport.clone())
                    .collect();
                bound.sort();
                let _ = reply.send(bound);
            }
            CoordinatorRequest::Shutdown => {}
        }
    }

    fn pipeline(&mut self, viewport: String, window: Option<String>, reply: PipelineReply) {
        match self.slots.get_mut(&viewport) {
            Some(Slot::Active { handle, .. }) if !handle.is_closed() => {
                let _ = reply.send(Ok(handle.clone()));
                return;
            }
            Some(Slot::Attempting(waiters)) => {
                waiters.push(reply);
                return;
            }
            _ => {}
        }

        self.slots
            .insert(viewport.clone(), Slot::Attempting(vec![reply]));
        let revalidate = self.reread_config();
        let registry = Arc::clone(&self.registry);
        let preferred = self.preferred.clone();
        let mailbox = self.mailbox.clone();
        let init = BackendInit {
            viewport: viewport.clone(),
            window,
            config: serde_json::Value::Null,
        };

        tokio::spawn(async move {
            let name = if revalidate {
                validate(registry.as_ref(), &preferred).await
            } else {
                preferred.clone()
            };
            let mut outcome = instantiate_with_fallback(registry.as_ref(), &name, init).await;
            outcome.demote |= name != preferred;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(CoordinatorRequest::Instantiated { viewport, outcome })
                    .await;
            }
        });
    }

    /// Adopt a changed backend name from the configuration. Returns true
    /// when the new name still needs checking against the registry.
    fn reread_config(&mut self) -> bool {
        let configured = self.config.borrow().default_pipeline.clone();
        if configured == self.configured {
            return false;
        }
        info!(
            from = %self.configured,
            to = %configured,
            "Preferred colour backend changed"
        );
        self.configured = configured.clone();
        self.preferred = configured;
        true
    }

    fn on_instantiated(&mut self, viewport: String, outcome: Instantiation) {
        if outcome.demote && self.preferred != defaults::BUILTIN_BACKEND {
            warn!(
                backend = %self.preferred,
                "Preferred colour backend unusable, builtin backend is now preferred"
            );
            self.preferred = defaults::BUILTIN_BACKEND.to_string();
        }

        let waiters = match self.slots.remove(&viewport) {
            Some(Slot::Attempting(waiters)) => waiters,
            Some(active) => {
                self.slots.insert(viewport, active);
                return;
            }
            None => Vec::new(),
        };

        let result = outcome.result.map(|backend| {
            let config = self.config.borrow().clone();
            ColourPipeline::spawn(backend, self.cache.clone(), &config)
        });

        match &result {
            Ok(handle) => {
                self.generation += 1;
                let generation = self.generation;
                info!(
                    viewport = %viewport,
                    backend = handle.backend_name(),
                    "Colour pipeline bound"
                );
                let watched = handle.clone();
                let key = viewport.clone();
                self.watchers.spawn(async move {
                    watched.closed().await;
                    (key, generation)
                });
                self.slots.insert(
                    viewport,
                    Slot::Active {
                        handle: handle.clone(),
                        generation,
                    },
                );
            }
            Err(e) => error!(viewport = %viewport, error = %e, "No colour pipeline available"),
        }

        for reply in waiters {
            let _ = reply.send(result.clone());
        }
    }

    fn on_pipeline_exited(&mut self, viewport: String, generation: u64) {
        let current = matches!(
            self.slots.get(&viewport),
            Some(Slot::Active { generation: g, .. }) if *g == generation
        );
        if current {
            warn!(viewport = %viewport, "Colour pipeline exited, unbinding viewport");
            self.slots.remove(&viewport);
        }
    }
}

/// `name` if the registry lists it, the builtin backend otherwise.
async fn validate(registry: &dyn BackendRegistry, name: &str) -> String {
    if name == defaults::BUILTIN_BACKEND {
        return name.to_string();
    }
    let available = registry.available().await;
    if available.iter().any(|candidate| candidate == name) {
        name.to_string()
    } else {
        warn!(
            backend = name,
            available = ?available,
            "Colour backend not available, using builtin"
        );
        defaults::BUILTIN_BACKEND.to_string()
    }
}

/// Try `preferred`, then the builtin backend once.
async fn instantiate_with_fallback(
    registry: &dyn BackendRegistry,
    preferred: &str,
    init: BackendInit,
) -> Instantiation {
    let first = match registry.instantiate(preferred, init.clone()).await {
        Ok(backend) => {
            return Instantiation {
                result: Ok(backend),
                demote: false,
            }
        }
        Err(e) => e,
    };

    if preferred == defaults::BUILTIN_BACKEND {
        return Instantiation {
            result: Err(first),
            demote: false,
        };
    }

    warn!(
        backend = preferred,
        viewport = %init.viewport,
        error = %first,
        "Colour backend failed to start, falling back to builtin"
    );
    let result = registry
        .instantiate(defaults::BUILTIN_BACKEND, init)
        .await
        .map_err(|fallback| {
            ColourError::FallbackExhausted(format!(
                "{} failed ({}), builtin failed ({})",
                preferred, first, fallback
            ))
        });
    Instantiation {
        result,
        demote: true,
    }
}

/// Cloneable address of a [`ColourPipelineCoordinator`].
#[derive(Debug, Clone)]
pub struct ColourCoordinatorHandle {
    tx: mpsc::Sender<CoordinatorRequest>,
    timeout: Option<Duration>,
}

impl ColourCoordinatorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorRequest,
    ) -> ColourResult<T> {
        let closed = || ColourError::PoolClosed("colour pipeline coordinator".into());
        let (reply, response) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| closed())?;
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| ColourError::Timeout(format!("coordinator after {:?}", limit)))?
                .map_err(|_| closed()),
            None => response.await.map_err(|_| closed()),
        }
    }

    /// Pipeline bound to `viewport`, starting one if needed.
    pub async fn pipeline(
        &self,
        viewport: impl Into<String>,
        window: Option<String>,
    ) -> ColourResult<ColourPipelineHandle> {
        let viewport = viewport.into();
        self.request(|reply| CoordinatorRequest::Pipeline {
            viewport,
            window,
            reply,
        })
        .await?
    }

    /// Pipeline used for thumbnails.
    pub async fn thumbnail_pipeline(&self) -> ColourResult<ColourPipelineHandle> {
        self.pipeline(defaults::THUMBNAIL_VIEWPORT, None).await
    }

    pub async fn process_thumbnail(
        &self,
        frame: SharedFrameDescriptor,
        buffer: ThumbnailBuffer,
    ) -> ColourResult<ThumbnailBuffer> {
        self.thumbnail_pipeline()
            .await?
            .process_thumbnail(frame, buffer)
            .await
    }

    /// Backend tried first for new viewports.
    pub async fn preferred_backend(&self) -> ColourResult<String> {
        self.request(CoordinatorRequest::PreferredBackend).await
    }

    /// Viewports with a running pipeline, sorted.
    pub async fn bound_viewports(&self) -> ColourResult<Vec<String>> {
        self.request(CoordinatorRequest::BoundViewports).await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(CoordinatorRequest::Shutdown).await;
    }
}
