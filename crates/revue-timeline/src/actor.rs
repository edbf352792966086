//! Edit list actor.
//!
//! Owns the flattened [`EditList`] built from an ordered set of sources and
//! answers resolution queries against it. The list is built once at spawn
//! and never changes afterwards; only the set of registered sources may
//! shrink while the actor runs.
//!
//! Point and range resolution are handed off to spawned tasks so that a
//! slow source never blocks the mailbox.

use revue_core::{
    defaults, FrameDescriptor, FrameRate, FrameTimeMap, MediaId, MediaType, RationalTime, Result,
    RevueError, TimeSourceMode, TimelineConfig,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::aggregate::{FrameMapBuilder, SourceTable};
use crate::edit_list::EditList;
use crate::source::MediaSource;

/// Notifications published to subscribers of an edit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    /// A source was removed on request.
    SourceRemoved(MediaId),
    /// A source went away on its own.
    SourceExited(MediaId),
}

enum Request {
    DurationFrames {
        tsm: TimeSourceMode,
        rate: FrameRate,
        reply: oneshot::Sender<i64>,
    },
    DurationTime {
        tsm: TimeSourceMode,
        rate: FrameRate,
        reply: oneshot::Sender<RationalTime>,
    },
    EditList(oneshot::Sender<EditList>),
    MediaPointer {
        media_type: MediaType,
        logical_frame: i64,
        reply: oneshot::Sender<Result<FrameDescriptor>>,
    },
    MediaPointers {
        media_type: MediaType,
        tsm: TimeSourceMode,
        rate: FrameRate,
        from_section: usize,
        reply: oneshot::Sender<Result<FrameTimeMap>>,
    },
    LogicalFrame {
        time: RationalTime,
        tsm: TimeSourceMode,
        rate: FrameRate,
        reply: oneshot::Sender<Result<i64>>,
    },
    TimeFromFrame {
        logical_frame: i64,
        tsm: TimeSourceMode,
        rate: FrameRate,
        reply: oneshot::Sender<RationalTime>,
    },
    MediaId(oneshot::Sender<Option<MediaId>>),
    SourceAtFrame {
        logical_frame: i64,
        reply: oneshot::Sender<Result<Option<MediaId>>>,
    },
    SkipThroughSources {
        skip_by: i64,
        ref_frame: i64,
        reply: oneshot::Sender<Result<MediaId>>,
    },
    RateAtFrame {
        logical_frame: i64,
        reply: oneshot::Sender<Result<FrameRate>>,
    },
    RemoveSource {
        id: MediaId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Await `fut`, giving up after `limit` if one is set.
async fn within<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RevueError::Timeout(format!("{} after {:?}", what, limit)))?,
        None => fut.await,
    }
}

/// Actor resolving logical frames of a multi-source timeline.
pub struct EditListActor {
    name: String,
    edit_list: EditList,
    sources: SourceTable,
    /// Registration order, used for the single-source fallbacks.
    order: Vec<MediaId>,
    events: broadcast::Sender<TimelineEvent>,
    watchers: JoinSet<MediaId>,
}

impl EditListActor {
    /// Build the edit list from `sources`, in order, and start the actor.
    ///
    /// A source that cannot describe `media_type` is asked once for the
    /// other media type instead. A source that fails both times adds no
    /// section but stays registered for point queries.
    pub async fn spawn(
        name: impl Into<String>,
        sources: Vec<Arc<dyn MediaSource>>,
        media_type: MediaType,
        config: TimelineConfig,
    ) -> EditListHandle {
        let name = name.into();
        let limit = config.request_timeout();
        let (events, _) = broadcast::channel(defaults::MAILBOX_CAPACITY);

        let mut actor = Self {
            name: name.clone(),
            edit_list: EditList::new(),
            sources: SourceTable::new(),
            order: Vec::new(),
            events: events.clone(),
            watchers: JoinSet::new(),
        };

        for source in sources {
            match within(limit, "edit list", source.edit_list(media_type)).await {
                Ok(fragment) => actor.edit_list.extend(&fragment),
                Err(first) => {
                    match within(limit, "edit list", source.edit_list(media_type.other())).await {
                        Ok(fragment) => {
                            debug!(
                                edit_list = %name,
                                requested = %media_type,
                                "Source has no {} stream, using {} section instead",
                                media_type,
                                media_type.other()
                            );
                            actor.edit_list.extend(&fragment);
                        }
                        Err(second) => warn!(
                            edit_list = %name,
                            first = %first,
                            second = %second,
                            "Source contributed no edit list section"
                        ),
                    }
                }
            }

            match within(limit, "identity", source.identity()).await {
                Ok(id) => actor.register(id, source),
                Err(e) => error!(edit_list = %name, error = %e, "Failed to identify source"),
            }
        }

        info!(
            edit_list = %name,
            sections = actor.edit_list.len(),
            sources = actor.order.len(),
            "Created edit list"
        );

        let (tx, rx) = mpsc::channel(defaults::MAILBOX_CAPACITY);
        tokio::spawn(actor.run(rx));

        EditListHandle {
            tx,
            events,
            name: Arc::from(name),
            timeout: limit,
        }
    }

    fn register(&mut self, id: MediaId, source: Arc<dyn MediaSource>) {
        if self.sources.insert(id, Arc::clone(&source)).is_none() {
            self.order.push(id);
        }
        self.watchers.spawn(async move {
            source.closed().await;
            id
        });
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle(request),
                },
                Some(exited) = self.watchers.join_next(), if !self.watchers.is_empty() => {
                    match exited {
                        Ok(id) => self.on_source_exited(id),
                        Err(e) => warn!(edit_list = %self.name, error = %e, "Source watcher failed"),
                    }
                }
            }
        }
        self.watchers.abort_all();
        debug!(edit_list = %self.name, "Edit list actor exited");
    }

    fn on_source_exited(&mut self, id: MediaId) {
        if self.unregister(id) {
            info!(edit_list = %self.name, source = %id, "Source exited");
            let _ = self.events.send(TimelineEvent::SourceExited(id));
        }
    }

    fn unregister(&mut self, id: MediaId) -> bool {
        if self.sources.remove(&id).is_some() {
            self.order.retain(|o| *o != id);
            true
        } else {
            false
        }
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::DurationFrames { tsm, rate, reply } => {
                let _ = reply.send(self.edit_list.duration_frames(tsm, rate));
            }
            Request::DurationTime { tsm, rate, reply } => {
                let _ = reply.send(self.edit_list.duration_time(tsm, rate));
            }
            Request::EditList(reply) => {
                let _ = reply.send(self.edit_list.clone());
            }
            Request::MediaPointer {
                media_type,
                logical_frame,
                reply,
            } => self.media_pointer(media_type, logical_frame, reply),
            Request::MediaPointers {
                media_type,
                tsm,
                rate,
                from_section,
                reply,
            } => {
                let builder = FrameMapBuilder::new(
                    self.edit_list.clone(),
                    self.sources.clone(),
                    media_type,
                    tsm,
                    rate,
                )
                .starting_at(from_section);
                let name = self.name.clone();
                tokio::spawn(async move {
                    let mut reply = reply;
                    let result = tokio::select! {
                        result = builder.run() => Some(result),
                        _ = reply.closed() => None,
                    };
                    match result {
                        Some(result) => {
                            let _ = reply.send(result);
                        }
                        None => debug!(edit_list = %name, "Frame map request abandoned"),
                    }
                });
            }
            Request::LogicalFrame {
                time,
                tsm,
                rate,
                reply,
            } => {
                let _ = reply.send(self.edit_list.logical_frame(tsm, time, rate));
            }
            Request::TimeFromFrame {
                logical_frame,
                tsm,
                rate,
                reply,
            } => {
                let _ = reply.send(self.edit_list.time_from_frame(tsm, logical_frame, rate));
            }
            Request::MediaId(reply) => {
                let single = match self.order.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                };
                let _ = reply.send(single);
            }
            Request::SourceAtFrame {
                logical_frame,
                reply,
            } => {
                let result = match self.edit_list.media_frame(logical_frame) {
                    Ok((_, section, _)) => Ok(self
                        .sources
                        .contains_key(&section.media_id)
                        .then_some(section.media_id)),
                    Err(e) if e.is_no_frames_left() && !self.order.is_empty() => {
                        Ok(self.order.first().copied())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Request::SkipThroughSources {
                skip_by,
                ref_frame,
                reply,
            } => {
                let result = match self.edit_list.skip_sections(ref_frame, skip_by) {
                    Ok(section) => Ok(section.media_id),
                    Err(e) if e.is_no_frames_left() && self.order.len() == 1 => {
                        debug!(edit_list = %self.name, "Skip ran off the end, staying on the only source");
                        Ok(self.order[0])
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Request::RateAtFrame {
                logical_frame,
                reply,
            } => {
                let _ = reply.send(
                    self.edit_list
                        .frame_rate_at_frame(logical_frame)
                        .ok_or(RevueError::NoFrames),
                );
            }
            Request::RemoveSource { id, reply } => {
                let removed = self.unregister(id);
                if removed {
                    info!(edit_list = %self.name, source = %id, "Source removed");
                    let _ = self.events.send(TimelineEvent::SourceRemoved(id));
                }
                let _ = reply.send(removed);
            }
            Request::Shutdown => {}
        }
    }

    fn media_pointer(
        &self,
        media_type: MediaType,
        logical_frame: i64,
        reply: oneshot::Sender<Result<FrameDescriptor>>,
    ) {
        let (section_id, local) = match self.edit_list.media_frame(logical_frame) {
            Ok((_, section, local)) => (section.media_id, local),
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let Some(source) = self.sources.get(&section_id).cloned() else {
            debug!(edit_list = %self.name, source = %section_id, "Source not registered, returning blank frame");
            let _ = reply.send(Ok(FrameDescriptor::blank(media_type)));
            return;
        };

        tokio::spawn(async move {
            let mut reply = reply;
            let result = tokio::select! {
                result = source.media_pointer(media_type, local) => Some(result),
                _ = reply.closed() => None,
            };
            if let Some(result) = result {
                let _ = reply.send(result);
            }
        });
    }
}

/// Cloneable address of an [`EditListActor`].
#[derive(Clone)]
pub struct EditListHandle {
    tx: mpsc::Sender<Request>,
    events: broadcast::Sender<TimelineEvent>,
    name: Arc<str>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for EditListHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditListHandle")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EditListHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the deadline applied to every request. `None` waits
    /// indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stream of source removal and exit notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let disconnected = || RevueError::Disconnected(self.name.to_string());
        let (reply, response) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| disconnected())?;
        within(self.timeout, &self.name, async {
            response.await.map_err(|_| disconnected())
        })
        .await
    }

    pub async fn duration_frames(&self, tsm: TimeSourceMode, rate: FrameRate) -> Result<i64> {
        self.request(|reply| Request::DurationFrames { tsm, rate, reply })
            .await
    }

    pub async fn duration_time(
        &self,
        tsm: TimeSourceMode,
        rate: FrameRate,
    ) -> Result<RationalTime> {
        self.request(|reply| Request::DurationTime { tsm, rate, reply })
            .await
    }

    /// Snapshot of the flattened edit list.
    pub async fn edit_list(&self) -> Result<EditList> {
        self.request(Request::EditList).await
    }

    /// Resolve one logical frame. A section whose source is no longer
    /// registered yields a blank descriptor.
    pub async fn media_pointer(
        &self,
        media_type: MediaType,
        logical_frame: i64,
    ) -> Result<FrameDescriptor> {
        self.request(|reply| Request::MediaPointer {
            media_type,
            logical_frame,
            reply,
        })
        .await?
    }

    /// Resolve the whole timeline into a frame/time map.
    pub async fn media_pointers(
        &self,
        media_type: MediaType,
        tsm: TimeSourceMode,
        rate: FrameRate,
    ) -> Result<FrameTimeMap> {
        self.media_pointers_from(media_type, tsm, rate, 0).await
    }

    /// Resolve sections `from_section..` into a frame/time map.
    pub async fn media_pointers_from(
        &self,
        media_type: MediaType,
        tsm: TimeSourceMode,
        rate: FrameRate,
        from_section: usize,
    ) -> Result<FrameTimeMap> {
        self.request(|reply| Request::MediaPointers {
            media_type,
            tsm,
            rate,
            from_section,
            reply,
        })
        .await?
    }

    pub async fn logical_frame_from_time(
        &self,
        time: RationalTime,
        tsm: TimeSourceMode,
        rate: FrameRate,
    ) -> Result<i64> {
        self.request(|reply| Request::LogicalFrame {
            time,
            tsm,
            rate,
            reply,
        })
        .await?
    }

    pub async fn time_from_logical_frame(
        &self,
        logical_frame: i64,
        tsm: TimeSourceMode,
        rate: FrameRate,
    ) -> Result<RationalTime> {
        self.request(|reply| Request::TimeFromFrame {
            logical_frame,
            tsm,
            rate,
            reply,
        })
        .await
    }

    /// Id of the only registered source, `None` when there are several.
    pub async fn media_id(&self) -> Result<Option<MediaId>> {
        self.request(Request::MediaId).await
    }

    /// Source owning `logical_frame`. Past either end the first registered
    /// source is returned.
    pub async fn source_at_frame(&self, logical_frame: i64) -> Result<Option<MediaId>> {
        self.request(|reply| Request::SourceAtFrame {
            logical_frame,
            reply,
        })
        .await?
    }

    /// Id of the source `skip_by` sections away from `ref_frame`.
    pub async fn skip_through_sources(&self, skip_by: i64, ref_frame: i64) -> Result<MediaId> {
        self.request(|reply| Request::SkipThroughSources {
            skip_by,
            ref_frame,
            reply,
        })
        .await?
    }

    pub async fn rate_at_frame(&self, logical_frame: i64) -> Result<FrameRate> {
        self.request(|reply| Request::RateAtFrame {
            logical_frame,
            reply,
        })
        .await?
    }

    /// Forget a source. Returns false if it was not registered.
    pub async fn remove_source(&self, id: MediaId) -> Result<bool> {
        self.request(|reply| Request::RemoveSource { id, reply })
            .await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown).await;
    }
}
