//! The query cache.
//!
//! Entries carry the invalidation epoch of their kind at the moment their
//! fetch started. Invalidating a kind bumps the epoch, which makes every
//! entry of that kind stale at once, including entries whose fetch is still
//! in flight: a response that raced a push event is stored (last write
//! wins) but never trusted as fresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use issuetrack_core::config::CacheConfig;
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::fetcher::QueryFetcher;
use issuetrack_core::types::QueryKey;

/// Whether a cached value can be served without refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within its freshness window and not invalidated.
    Fresh,
    /// Invalidated or past its freshness window.
    Stale,
}

/// A cached value as seen by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    /// The value from the last successful fetch.
    pub value: Value,
    /// Its freshness right now.
    pub freshness: Freshness,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads that had to fetch.
    pub misses: u64,
    /// Fetches issued.
    pub fetches: u64,
    /// Kind invalidations applied.
    pub invalidations: u64,
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    /// Kind epoch when the fetch that produced this value started.
    epoch: u64,
    fresh_until: Instant,
    /// Invalidated individually.
    stale: bool,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug)]
struct CacheInner {
    entries: Cache<QueryKey, Arc<CacheEntry>>,
    fetcher: Arc<dyn QueryFetcher>,
    fresh_ttl: Duration,
    /// Invalidation epoch per kind.
    epochs: DashMap<String, u64>,
    /// Per-key fetch locks, present only while someone is fetching.
    inflight: DashMap<QueryKey, Arc<Mutex<()>>>,
    /// Keys currently on screen, with their watcher counts.
    active: DashMap<QueryKey, usize>,
    /// Bumped by `clear`; fetches that straddle a clear are not stored.
    generation: AtomicU64,
    counters: Counters,
}

/// Caches logical reads by [`QueryKey`].
///
/// Cheap to clone; clones share entries.
#[derive(Debug, Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    /// Create a cache that loads values through `fetcher`.
    pub fn new(config: &CacheConfig, fetcher: Arc<dyn QueryFetcher>) -> Self {
        let entries = Cache::builder().max_capacity(config.max_capacity).build();
        Self {
            inner: Arc::new(CacheInner {
                entries,
                fetcher,
                fresh_ttl: Duration::from_secs(config.fresh_ttl_seconds),
                epochs: DashMap::new(),
                inflight: DashMap::new(),
                active: DashMap::new(),
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Read `key`, fetching it if there is no fresh value.
    ///
    /// Concurrent reads of the same key share one fetch.
    pub async fn read(&self, key: &QueryKey) -> AppResult<Value> {
        if let Some(value) = self.fresh_value(key).await {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let lock = self.fetch_lock(key);
        let guard = lock.lock().await;
        // Someone may have fetched while we waited.
        let result = match self.fresh_value(key).await {
            Some(value) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            None => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.fetch_and_store(key).await
            }
        };
        drop(guard);
        self.release_fetch_lock(key, lock);
        result
    }

    /// Fetch `key` now, regardless of freshness. Waits for a fetch of the
    /// same key already in flight instead of running alongside it.
    pub async fn refetch(&self, key: &QueryKey) -> AppResult<Value> {
        let lock = self.fetch_lock(key);
        let guard = lock.lock().await;
        let result = self.fetch_and_store(key).await;
        drop(guard);
        self.release_fetch_lock(key, lock);
        result
    }

    /// Look at a cached value without fetching.
    pub async fn peek(&self, key: &QueryKey) -> Option<CachedQuery> {
        let entry = self.inner.entries.get(key).await?;
        let freshness = self.freshness(key, &entry);
        Some(CachedQuery {
            value: entry.value.clone(),
            freshness,
        })
    }

    /// Whether `key` is cached but stale. `None` when not cached.
    pub async fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.peek(key)
            .await
            .map(|cached| cached.freshness == Freshness::Stale)
    }

    /// Store a value obtained elsewhere (for example from a write response).
    pub async fn put(&self, key: QueryKey, value: Value) {
        let epoch = self.epoch(&key.kind);
        self.store(key, value, epoch).await;
    }

    /// Mark every entry of `kind` stale, list and detail views alike.
    /// Returns how many cached entries were affected.
    pub fn invalidate_kind(&self, kind: &str) -> usize {
        *self.inner.epochs.entry(kind.to_string()).or_insert(0) += 1;
        self.inner.counters.invalidations.fetch_add(1, Ordering::Relaxed);

        let affected = self
            .inner
            .entries
            .iter()
            .filter(|(key, _)| key.matches_kind(kind))
            .count();
        debug!(kind, affected, "Invalidated cached queries");
        affected
    }

    /// Mark one entry stale.
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        let Some(entry) = self.inner.entries.get(key).await else {
            return false;
        };
        let marked = Arc::new(CacheEntry {
            value: entry.value.clone(),
            epoch: entry.epoch,
            fresh_until: entry.fresh_until,
            stale: true,
        });
        self.inner.entries.insert(key.clone(), marked).await;
        true
    }

    /// Drop one entry.
    pub async fn evict(&self, key: &QueryKey) {
        self.inner.entries.invalidate(key).await;
    }

    /// Drop everything. Called on logout so no data outlives the session
    /// that was allowed to see it.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.entries.invalidate_all();
        info!("Query cache cleared");
    }

    /// Register `key` as on screen until the returned guard is dropped.
    pub fn watch(&self, key: QueryKey) -> ActiveQuery {
        *self.inner.active.entry(key.clone()).or_insert(0) += 1;
        ActiveQuery {
            key,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Keys of `kind` currently on screen.
    pub fn watched(&self, kind: &str) -> Vec<QueryKey> {
        self.inner
            .active
            .iter()
            .filter(|entry| entry.key().matches_kind(kind))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> u64 {
        self.inner.entries.run_pending_tasks().await;
        self.inner.entries.entry_count()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
        }
    }

    async fn fresh_value(&self, key: &QueryKey) -> Option<Value> {
        let entry = self.inner.entries.get(key).await?;
        match self.freshness(key, &entry) {
            Freshness::Fresh => Some(entry.value.clone()),
            Freshness::Stale => None,
        }
    }

    fn freshness(&self, key: &QueryKey, entry: &CacheEntry) -> Freshness {
        let expired = Instant::now() >= entry.fresh_until;
        if entry.stale || entry.epoch < self.epoch(&key.kind) || expired {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    async fn fetch_and_store(&self, key: &QueryKey) -> AppResult<Value> {
        let epoch = self.epoch(&key.kind);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Fetching query");

        let value = self.inner.fetcher.fetch(key).await?;
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            self.store(key.clone(), value.clone(), epoch).await;
        } else {
            debug!(key = %key, "Cache cleared during fetch, not storing result");
        }
        Ok(value)
    }

    async fn store(&self, key: QueryKey, value: Value, epoch: u64) {
        let entry = Arc::new(CacheEntry {
            value,
            epoch,
            fresh_until: Instant::now() + self.inner.fresh_ttl,
            stale: false,
        });
        self.inner.entries.insert(key, entry).await;
    }

    fn epoch(&self, kind: &str) -> u64 {
        self.inner.epochs.get(kind).map(|e| *e).unwrap_or(0)
    }

    fn fetch_lock(&self, key: &QueryKey) -> Arc<Mutex<()>> {
        self.inner
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_fetch_lock(&self, key: &QueryKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.inner
            .inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Keeps a query registered as on screen. Dropping it unregisters.
#[derive(Debug)]
pub struct ActiveQuery {
    key: QueryKey,
    inner: std::sync::Weak<CacheInner>,
}

impl ActiveQuery {
    /// The watched key.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        inner
            .active
            .remove_if_mut(&self.key, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    use crate::keys;

    /// Returns `{"key": <key>, "n": <fetch number>}` after an optional delay.
    #[derive(Debug, Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl QueryFetcher for CountingFetcher {
        async fn fetch(&self, key: &QueryKey) -> AppResult<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(json!({"key": key.to_string(), "n": n}))
        }
    }

    fn cache_with(fetcher: Arc<CountingFetcher>) -> QueryCache {
        QueryCache::new(&CacheConfig::default(), fetcher)
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_from_cache() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = cache_with(fetcher.clone());
        let key = keys::issue(7u64);

        let first = cache.read(&key).await.unwrap();
        let second = cache.read(&key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_invalidating_kind_marks_lists_and_details_stale() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = cache_with(fetcher.clone());
        let list = keys::issue_list([("status", "open")]);
        let detail = keys::issue(7u64);
        let user = keys::user(1u64);
        for key in [&list, &detail, &user] {
            cache.read(key).await.unwrap();
        }

        assert_eq!(cache.invalidate_kind(keys::ISSUE), 2);

        assert_eq!(cache.is_stale(&list).await, Some(true));
        assert_eq!(cache.is_stale(&detail).await, Some(true));
        assert_eq!(cache.is_stale(&user).await, Some(false));
        // Stale entries are kept, not evicted.
        assert_eq!(cache.peek(&list).await.unwrap().value["n"], 1);

        let refreshed = cache.read(&list).await.unwrap();
        assert_eq!(refreshed["n"], 4);
        assert_eq!(cache.is_stale(&list).await, Some(false));
    }

    #[tokio::test]
    async fn test_concurrent_stale_reads_share_one_fetch() {
        let fetcher = Arc::new(CountingFetcher {
            delay: Duration::from_millis(20),
            ..CountingFetcher::default()
        });
        let cache = cache_with(fetcher.clone());
        let key = keys::issue_list([]);
        cache.read(&key).await.unwrap();
        cache.invalidate_kind(keys::ISSUE);

        let reads = (0..4).map(|_| cache.read(&key));
        let values = join_all(reads).await;

        assert!(values.iter().all(|v| v.as_ref().unwrap()["n"] == 2));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_event_during_fetch_leaves_result_stale() {
        let fetcher = Arc::new(CountingFetcher {
            delay: Duration::from_millis(30),
            ..CountingFetcher::default()
        });
        let cache = cache_with(fetcher.clone());
        let key = keys::issue(7u64);

        let reader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.read(&key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate_kind(keys::ISSUE);

        // The reader still gets its value.
        assert_eq!(reader.await.unwrap().unwrap()["n"], 1);
        // But it predates the event, so it is not trusted.
        assert_eq!(cache.is_stale(&key).await, Some(true));
        assert_eq!(cache.read(&key).await.unwrap()["n"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_age_out_of_freshness() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = cache_with(fetcher.clone());
        let key = keys::dashboard();

        cache.read(&key).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.is_stale(&key).await, Some(false));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.is_stale(&key).await, Some(true));
    }

    #[tokio::test]
    async fn test_single_key_invalidation_and_eviction() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = cache_with(fetcher.clone());
        let a = keys::issue(1u64);
        let b = keys::issue(2u64);
        cache.read(&a).await.unwrap();
        cache.read(&b).await.unwrap();

        assert!(cache.invalidate(&a).await);
        assert_eq!(cache.is_stale(&a).await, Some(true));
        assert_eq!(cache.is_stale(&b).await, Some(false));

        cache.evict(&b).await;
        assert!(cache.peek(&b).await.is_none());
        assert!(!cache.invalidate(&b).await);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = cache_with(Arc::new(CountingFetcher::default()));
        cache.read(&keys::issue(1u64)).await.unwrap();
        cache.read(&keys::user_list()).await.unwrap();

        cache.clear();
        assert!(cache.is_empty().await);
        assert!(cache.peek(&keys::issue(1u64)).await.is_none());
    }

    #[tokio::test]
    async fn test_watch_guard_registers_until_dropped() {
        let cache = cache_with(Arc::new(CountingFetcher::default()));
        let first = cache.watch(keys::issue(1u64));
        let second = cache.watch(keys::issue(1u64));
        let _user = cache.watch(keys::user_list());

        assert_eq!(cache.watched(keys::ISSUE), vec![keys::issue(1u64)]);
        drop(first);
        assert_eq!(cache.watched(keys::ISSUE).len(), 1);
        drop(second);
        assert!(cache.watched(keys::ISSUE).is_empty());
        assert_eq!(cache.watched(keys::USER).len(), 1);
    }
}
