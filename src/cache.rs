//! Read-Model Cache.
//!
//! A process-local, TTL- and LRU-bounded memo of repository reads. Values are
//! stored type-erased and cloned out on a hit. Writes flush the whole cache
//! through [`ReadCache::invalidate_all`].
//!
//! Only one process may write through a given cache instance; there is no
//! cross-process invalidation.

use std::any::Any;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::Result;

/// One variant per cached read, carrying the call's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    UserCourses(String),
    AllCourses,
    CourseDetails(String),
    CourseMetadata(String),
    CourseUnits(String),
    UnitSections { course_code: String, unit_id: String },
    Section { course_code: String, unit_id: String, section_id: String },
    SectionLocation(String),
    CustomAssistants(String),
    FileContent(String),
    CourseGraph(String),
    OpenCourses,
}

#[derive(Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Clone)]
pub struct ReadCache {
    store: Arc<RwLock<LruCache<CacheKey, CacheEntry>>>,
    ttl: Duration,
    /// Bumped by every flush so loads that straddle a write are not stored.
    generation: Arc<AtomicU64>,
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCache")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ReadCache {
    /// A zero `max_entries` is treated as one.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Returns the cached value for `key`, or runs `loader` and caches its
    /// result. Errors are returned as-is and never cached.
    pub async fn get_or_load<T, F, Fut>(&self, key: CacheKey, loader: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(&key).await {
            trace!("Cache hit: {key:?}");
            return Ok(value);
        }
        trace!("Cache miss: {key:?}");

        let generation = self.generation.load(Ordering::SeqCst);
        let value = loader().await?;

        let mut store = self.store.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            store.put(
                key,
                CacheEntry {
                    value: Arc::new(value.clone()),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        Ok(value)
    }

    async fn get<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        let mut store = self.store.write().await;
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                store.pop(key);
                None
            }
            Some(entry) => entry.value.downcast_ref::<T>().cloned(),
            None => None,
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.store.write().await.pop(key);
    }

    /// Drops every entry. Called after each successful write.
    pub async fn invalidate_all(&self) {
        let mut store = self.store.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let flushed = store.len();
        store.clear();
        debug!("Read cache flushed ({flushed} entries)");
    }
}
