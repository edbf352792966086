//! Media source collaborators.
//!
//! A [`MediaSource`] answers edit-list and frame-pointer queries for one
//! clip. [`SourceResolver`] runs a source on its own task behind a mailbox
//! so that callers see an address that can go away at runtime.

use async_trait::async_trait;
use revue_core::{
    defaults, FrameDescriptor, FrameRanges, FrameRate, MediaId, MediaType, Result, RevueError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::edit_list::EditList;

/// Something that can describe and resolve the frames of one clip.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Stable identity of the source.
    async fn identity(&self) -> Result<MediaId>;

    /// Edit list fragment covering this source's frames of `media_type`.
    async fn edit_list(&self, media_type: MediaType) -> Result<EditList>;

    /// Descriptor for one source frame.
    async fn media_pointer(&self, media_type: MediaType, frame: i64) -> Result<FrameDescriptor>;

    /// Descriptors for every frame in `ranges`.
    ///
    /// Range values count frames from the start of the source's section,
    /// expressed at `rate`. On success the result holds exactly one
    /// descriptor per requested frame.
    async fn media_pointers(
        &self,
        media_type: MediaType,
        ranges: FrameRanges,
        rate: FrameRate,
    ) -> Result<Vec<FrameDescriptor>>;

    /// Completes once the source has gone away. Sources that never exit
    /// keep the default.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

#[async_trait]
impl<T: MediaSource + ?Sized> MediaSource for Arc<T> {
    async fn identity(&self) -> Result<MediaId> {
        (**self).identity().await
    }

    async fn edit_list(&self, media_type: MediaType) -> Result<EditList> {
        (**self).edit_list(media_type).await
    }

    async fn media_pointer(&self, media_type: MediaType, frame: i64) -> Result<FrameDescriptor> {
        (**self).media_pointer(media_type, frame).await
    }

    async fn media_pointers(
        &self,
        media_type: MediaType,
        ranges: FrameRanges,
        rate: FrameRate,
    ) -> Result<Vec<FrameDescriptor>> {
        (**self).media_pointers(media_type, ranges, rate).await
    }

    async fn closed(&self) {
        (**self).closed().await
    }
}

// ── Resolver actor ──────────────────────────────────────────────

enum SourceRequest {
    Identity(oneshot::Sender<Result<MediaId>>),
    EditList {
        media_type: MediaType,
        reply: oneshot::Sender<Result<EditList>>,
    },
    MediaPointer {
        media_type: MediaType,
        frame: i64,
        reply: oneshot::Sender<Result<FrameDescriptor>>,
    },
    MediaPointers {
        media_type: MediaType,
        ranges: FrameRanges,
        rate: FrameRate,
        reply: oneshot::Sender<Result<Vec<FrameDescriptor>>>,
    },
    Shutdown,
}

/// Runs a [`MediaSource`] on a dedicated task.
pub struct SourceResolver;

impl SourceResolver {
    /// Start serving `source`. Requests are handled one at a time in
    /// arrival order.
    pub fn spawn<S>(name: impl Into<String>, source: S) -> SourceResolverHandle
    where
        S: MediaSource + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, mut rx) = mpsc::channel(defaults::MAILBOX_CAPACITY);
        let task_name = Arc::clone(&name);

        tokio::spawn(async move {
            debug!(source = %task_name, "Source resolver started");
            while let Some(request) = rx.recv().await {
                match request {
                    SourceRequest::Identity(reply) => {
                        let _ = reply.send(source.identity().await);
                    }
                    SourceRequest::EditList { media_type, reply } => {
                        let _ = reply.send(source.edit_list(media_type).await);
                    }
                    SourceRequest::MediaPointer {
                        media_type,
                        frame,
                        reply,
                    } => {
                        let _ = reply.send(source.media_pointer(media_type, frame).await);
                    }
                    SourceRequest::MediaPointers {
                        media_type,
                        ranges,
                        rate,
                        reply,
                    } => {
                        trace!(source = %task_name, ranges = ranges.len(), "Batch request");
                        let _ = reply.send(source.media_pointers(media_type, ranges, rate).await);
                    }
                    SourceRequest::Shutdown => break,
                }
            }
            debug!(source = %task_name, "Source resolver exited");
        });

        SourceResolverHandle { tx, name }
    }
}

/// Address of a running [`SourceResolver`].
#[derive(Clone)]
pub struct SourceResolverHandle {
    tx: mpsc::Sender<SourceRequest>,
    name: Arc<str>,
}

impl std::fmt::Debug for SourceResolverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResolverHandle")
            .field("name", &self.name)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SourceResolverHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the resolver task. Pending requests are dropped.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SourceRequest::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> SourceRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| RevueError::Disconnected(self.name.to_string()))?;
        response
            .await
            .map_err(|_| RevueError::Disconnected(self.name.to_string()))?
    }
}

#[async_trait]
impl MediaSource for SourceResolverHandle {
    async fn identity(&self) -> Result<MediaId> {
        self.request(SourceRequest::Identity).await
    }

    async fn edit_list(&self, media_type: MediaType) -> Result<EditList> {
        self.request(|reply| SourceRequest::EditList { media_type, reply })
            .await
    }

    async fn media_pointer(&self, media_type: MediaType, frame: i64) -> Result<FrameDescriptor> {
        self.request(|reply| SourceRequest::MediaPointer {
            media_type,
            frame,
            reply,
        })
        .await
    }

    async fn media_pointers(
        &self,
        media_type: MediaType,
        ranges: FrameRanges,
        rate: FrameRate,
    ) -> Result<Vec<FrameDescriptor>> {
        self.request(|reply| SourceRequest::MediaPointers {
            media_type,
            ranges,
            rate,
            reply,
        })
        .await
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticSource;
    use revue_core::FrameRange;
    use smallvec::smallvec;

    #[tokio::test]
    async fn test_resolver_forwards_requests() {
        let source = SyntheticSource::builder("plate").frames(5).build();
        let id = source.id();
        let handle = SourceResolver::spawn("plate", source);

        assert_eq!(handle.identity().await.unwrap(), id);
        let list = handle.edit_list(MediaType::Image).await.unwrap();
        assert_eq!(list.len(), 1);

        let frames = handle
            .media_pointers(MediaType::Image, smallvec![FrameRange::leading(5)], FrameRate::FPS_24)
            .await
            .unwrap();
        assert_eq!(frames.len(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let handle = SourceResolver::spawn("plate", SyntheticSource::builder("plate").build());
        handle.shutdown().await;
        handle.closed().await;
        assert!(matches!(
            handle.identity().await,
            Err(RevueError::Disconnected(_))
        ));
    }
}
