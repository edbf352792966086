//! Colour data cache.
//!
//! Keys are backend hashes; values are the shared part of a pipeline.
//! Writes are fire-and-forget and the last write for a key wins, which is
//! safe because the value for a key is deterministic.

use async_trait::async_trait;
use lru::LruCache;
use revue_core::ColourConfig;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::data::SharedColourData;
use crate::error::{ColourError, ColourResult};

/// Cache collaborator used by the colour pipeline.
#[async_trait]
pub trait ColourCache: Send + Sync {
    /// Cached data for `key`. Any failure reads as a miss.
    async fn get(&self, key: &str) -> Option<SharedColourData>;

    /// Store `data` under `key` without waiting.
    fn put(&self, key: String, data: SharedColourData);
}

enum CacheRequest {
    Get {
        key: String,
        reply: oneshot::Sender<Option<SharedColourData>>,
    },
    Put {
        key: String,
        data: SharedColourData,
    },
    Count(oneshot::Sender<usize>),
    SizeBytes(oneshot::Sender<usize>),
    Keys(oneshot::Sender<Vec<String>>),
    Erase {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    SetLimits {
        max_count: usize,
        max_size: usize,
    },
    Clear,
    Shutdown,
}

struct Entry {
    data: SharedColourData,
    size: usize,
}

/// Bounded store with least-recently-used eviction.
struct CacheStore {
    entries: LruCache<String, Entry>,
    total_size: usize,
    max_count: usize,
    max_size: usize,
}

impl CacheStore {
    fn new(max_count: usize, max_size: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_size: 0,
            max_count,
            max_size,
        }
    }

    fn get(&mut self, key: &str) -> Option<SharedColourData> {
        self.entries
            .get(key)
            .map(|entry| SharedColourData::clone(&entry.data))
    }

    fn put(&mut self, key: String, data: SharedColourData) {
        let size = data.size_bytes();
        self.total_size += size;
        // unbounded, so a returned pair is always the replaced value
        if let Some((_, old)) = self.entries.push(key, Entry { data, size }) {
            self.total_size -= old.size;
        }
        self.evict();
    }

    fn erase(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_size -= entry.size;
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }

    fn set_limits(&mut self, max_count: usize, max_size: usize) {
        self.max_count = max_count;
        self.max_size = max_size;
        self.evict();
    }

    /// Keys from least to most recently used.
    fn keys(&self) -> Vec<String> {
        self.entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_count || self.total_size > self.max_size {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_size -= entry.size;
            trace!(key = %key, "Evicted colour cache entry");
        }
    }
}

/// Runs the colour cache on its own task.
pub struct ColourCacheActor;

impl ColourCacheActor {
    pub fn spawn(max_count: usize, max_size_bytes: usize) -> ColourCacheHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut store = CacheStore::new(max_count, max_size_bytes);

        tokio::spawn(async move {
            debug!(max_count, max_size_bytes, "Colour cache started");
            while let Some(request) = rx.recv().await {
                match request {
                    CacheRequest::Get { key, reply } => {
                        let _ = reply.send(store.get(&key));
                    }
                    CacheRequest::Put { key, data } => store.put(key, data),
                    CacheRequest::Count(reply) => {
                        let _ = reply.send(store.entries.len());
                    }
                    CacheRequest::SizeBytes(reply) => {
                        let _ = reply.send(store.total_size);
                    }
                    CacheRequest::Keys(reply) => {
                        let _ = reply.send(store.keys());
                    }
                    CacheRequest::Erase { key, reply } => {
                        let _ = reply.send(store.erase(&key));
                    }
                    CacheRequest::SetLimits {
                        max_count,
                        max_size,
                    } => {
                        debug!(max_count, max_size, "Colour cache limits changed");
                        store.set_limits(max_count, max_size);
                    }
                    CacheRequest::Clear => store.clear(),
                    CacheRequest::Shutdown => break,
                }
            }
            debug!("Colour cache exited");
        });

        ColourCacheHandle { tx }
    }
}

/// Cloneable address of a [`ColourCacheActor`].
#[derive(Debug, Clone)]
pub struct ColourCacheHandle {
    tx: mpsc::UnboundedSender<CacheRequest>,
}

impl ColourCacheHandle {
    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> CacheRequest) -> ColourResult<T> {
        let stopped = || ColourError::Cache("colour cache has stopped".into());
        let (reply, response) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    pub async fn count(&self) -> ColourResult<usize> {
        self.query(CacheRequest::Count).await
    }

    /// Total payload size of all entries.
    pub async fn size_bytes(&self) -> ColourResult<usize> {
        self.query(CacheRequest::SizeBytes).await
    }

    /// Keys from least to most recently used.
    pub async fn keys(&self) -> ColourResult<Vec<String>> {
        self.query(CacheRequest::Keys).await
    }

    pub async fn erase(&self, key: impl Into<String>) -> ColourResult<bool> {
        let key = key.into();
        self.query(|reply| CacheRequest::Erase { key, reply }).await
    }

    pub fn clear(&self) {
        let _ = self.tx.send(CacheRequest::Clear);
    }

    /// Apply new bounds, evicting at once if the cache is over them.
    pub fn set_limits(&self, max_count: usize, max_size_bytes: usize) {
        let _ = self.tx.send(CacheRequest::SetLimits {
            max_count,
            max_size: max_size_bytes,
        });
    }

    /// Track the cache bounds in `config` until either side goes away.
    pub fn follow_config(&self, mut config: watch::Receiver<ColourConfig>) {
        let handle = self.clone();
        tokio::spawn(async move {
            while config.changed().await.is_ok() {
                let (max_count, max_size) = {
                    let current = config.borrow_and_update();
                    (current.cache_max_count, current.cache_max_size_bytes())
                };
                if handle.tx.is_closed() {
                    break;
                }
                handle.set_limits(max_count, max_size);
            }
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(CacheRequest::Shutdown);
    }
}

#[async_trait]
impl ColourCache for ColourCacheHandle {
    async fn get(&self, key: &str) -> Option<SharedColourData> {
        let key = key.to_string();
        match self.query(|reply| CacheRequest::Get { key, reply }).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(error = %e, "Colour cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn put(&self, key: String, data: SharedColourData) {
        if self.tx.send(CacheRequest::Put { key, data }).is_err() {
            debug!("Colour cache has stopped, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColourLut, ColourOperation, ColourPipelineData, OperationStage};
    use std::sync::Arc;

    /// Entry whose payload is `luts` LUTs of one RGB entry (12 bytes each).
    fn entry(id: &str, luts: usize) -> SharedColourData {
        let mut data = ColourPipelineData::new(id);
        data.push_operation(ColourOperation {
            stage: OperationStage::ToLinear,
            cache_id: String::new(),
            shader: String::new(),
            luts: (0..luts).map(|_| ColourLut::new("l", vec![[0.0; 3]])).collect(),
        });
        Arc::new(data)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        assert!(cache.get("a").await.is_none());
        cache.put("a".into(), entry("a", 1));
        let hit = cache.get("a").await.unwrap();
        assert_eq!(hit.cache_id, "a");
        assert_eq!(cache.count().await.unwrap(), 1);
        assert_eq!(cache.size_bytes().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        cache.put("a".into(), entry("first", 1));
        cache.put("a".into(), entry("second", 2));
        assert_eq!(cache.get("a").await.unwrap().cache_id, "second");
        assert_eq!(cache.count().await.unwrap(), 1);
        assert_eq!(cache.size_bytes().await.unwrap(), 24);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used_by_count() {
        let cache = ColourCacheActor::spawn(2, 1 << 20);
        cache.put("a".into(), entry("a", 1));
        cache.put("b".into(), entry("b", 1));
        assert!(cache.get("a").await.is_some());
        cache.put("c".into(), entry("c", 1));
        assert_eq!(cache.keys().await.unwrap(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_evicts_by_size() {
        let cache = ColourCacheActor::spawn(100, 30);
        cache.put("a".into(), entry("a", 2));
        cache.put("b".into(), entry("b", 1));
        assert_eq!(cache.keys().await.unwrap(), vec!["b".to_string()]);
        assert_eq!(cache.size_bytes().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_lookup_refreshes_recency() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        for key in ["a", "b", "c"] {
            cache.put(key.into(), entry(key, 1));
        }
        assert!(cache.get("a").await.is_some());
        assert_eq!(
            cache.keys().await.unwrap(),
            vec!["b".to_string(), "c".to_string(), "a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_shrinking_limits_evicts_at_once() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        for key in ["a", "b", "c", "d"] {
            cache.put(key.into(), entry(key, 1));
        }
        cache.set_limits(2, 1 << 20);
        assert_eq!(cache.keys().await.unwrap(), vec!["c".to_string(), "d".to_string()]);

        cache.set_limits(2, 12);
        assert_eq!(cache.keys().await.unwrap(), vec!["d".to_string()]);
        assert_eq!(cache.size_bytes().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_follows_config_changes() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        for key in ["a", "b", "c"] {
            cache.put(key.into(), entry(key, 1));
        }
        let (tx, rx) = watch::channel(ColourConfig::default());
        cache.follow_config(rx);

        tx.send_modify(|config| config.cache_max_count = 1);
        while cache.count().await.unwrap() > 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.keys().await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_erase_and_clear() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        cache.put("a".into(), entry("a", 1));
        cache.put("b".into(), entry("b", 1));
        assert!(cache.erase("a").await.unwrap());
        assert!(!cache.erase("a").await.unwrap());
        cache.clear();
        assert_eq!(cache.count().await.unwrap(), 0);
        assert_eq!(cache.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stopped_cache_reads_as_miss() {
        let cache = ColourCacheActor::spawn(10, 1 << 20);
        cache.put("a".into(), entry("a", 1));
        cache.shutdown();
        let err = loop {
            match cache.count().await {
                Err(e) => break e,
                Ok(_) => tokio::task::yield_now().await,
            }
        };
        assert!(matches!(err, ColourError::Cache(_)));
        assert!(cache.get("a").await.is_none());
    }
}
