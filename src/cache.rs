//! Remote-aware cache coordinator.
//!
//! Local paths never populate this cache — OS stat/readdir calls are
//! cheap enough that caching them only adds staleness risk. Remote and
//! archive backends are cached aggressively, keyed by
//! `(backend, operation, canonical-key)` with LRU eviction and TTL,
//! mirroring the teacher's `S3ClientCache` (`RwLock<HashMap<..>>`).

use crate::path::stat::Stat;
use crate::path::TfmPath;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum CacheValue {
    Listing(Vec<(String, Stat)>),
    Stat(Stat),
}

struct Entry {
    value: CacheValue,
    version: u64,
    inserted_at: Instant,
    last_accessed: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    ArchiveCreate,
    ArchiveExtract,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    backend: String,
    operation: &'static str,
    canonical_key: String,
}

/// LRU+TTL cache, one instance shared across backends; the coordinator
/// in front of it only decides *what* to invalidate, never stores data
/// itself.
pub struct BackendCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    capacity: usize,
    ttl: Duration,
    version_counter: std::sync::atomic::AtomicU64,
}

impl BackendCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), capacity, ttl, version_counter: std::sync::atomic::AtomicU64::new(0) }
    }

    fn key(backend: &str, operation: &'static str, canonical_key: &str) -> CacheKey {
        CacheKey { backend: backend.to_string(), operation, canonical_key: canonical_key.to_string() }
    }

    pub fn get(&self, backend: &str, operation: &'static str, canonical_key: &str) -> Option<CacheValue> {
        let key = Self::key(backend, operation, canonical_key);
        let mut entries = self.entries.write().unwrap();
        let expired = entries.get(&key).map(|e| e.inserted_at.elapsed() > self.ttl).unwrap_or(false);
        if expired {
            entries.remove(&key);
            return None;
        }
        let entry = entries.get_mut(&key)?;
        entry.last_accessed = Instant::now();
        Some(entry.value.clone())
    }

    pub fn put(&self, backend: &str, operation: &'static str, canonical_key: &str, value: CacheValue) {
        let key = Self::key(backend, operation, canonical_key);
        let version = self.version_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            self.evict_lru(&mut entries);
        }
        entries.insert(key, Entry { value, version, inserted_at: Instant::now(), last_accessed: Instant::now() });
    }

    fn evict_lru(&self, entries: &mut HashMap<CacheKey, Entry>) {
        if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.last_accessed).map(|(k, _)| k.clone()) {
            entries.remove(&oldest);
        }
    }

    pub fn invalidate_key(&self, backend: &str, canonical_key: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|k, _| !(k.backend == backend && k.canonical_key == canonical_key));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

/// Invalidation policy, backend-agnostic. Holds no data of its own; the
/// actual cache lives in [`BackendCache`], shared via `Arc` with every
/// backend that populates it.
pub struct CacheCoordinator {
    cache: Arc<BackendCache>,
}

impl CacheCoordinator {
    pub fn new(cache: Arc<BackendCache>) -> Self {
        Self { cache }
    }

    /// Expire the entry itself and its parent listing. Local paths are
    /// no-ops — walking up to "the nearest remote-backend directory"
    /// degenerates to nothing when the whole chain is local.
    pub fn invalidate(&self, paths: &[TfmPath], _reason: &str) {
        for path in paths {
            if !path.is_remote() {
                continue;
            }
            let backend = backend_id(path);
            let key = path.to_display_string();
            self.cache.invalidate_key(&backend, &key);
            let parent = path.parent();
            let parent_key = parent.to_display_string();
            self.cache.invalidate_key(&backend, &parent_key);
        }
    }

    pub fn invalidate_for_operation(&self, op_kind: OperationKind, sources: &[TfmPath], destination: Option<&TfmPath>) {
        match op_kind {
            OperationKind::Move | OperationKind::Delete => {
                self.invalidate(sources, "source removed");
                for source in sources {
                    self.invalidate(&[source.parent()], "source parent stale");
                }
            }
            OperationKind::Copy | OperationKind::ArchiveCreate | OperationKind::ArchiveExtract => {}
        }
        if let Some(dest) = destination {
            self.invalidate(&[dest.clone(), dest.parent()], "destination written");
        }
    }

    pub fn cache(&self) -> &Arc<BackendCache> {
        &self.cache
    }
}

/// Shared with the backends that populate the cache (`path/mod.rs`,
/// `path/archive.rs`) so a put and a later invalidate always agree on
/// the same key.
pub(crate) fn backend_id(path: &TfmPath) -> String {
    format!("{:?}", path.scheme())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_are_never_cached_on_invalidate() {
        let cache = Arc::new(BackendCache::new(10, Duration::from_secs(60)));
        let coordinator = CacheCoordinator::new(cache.clone());
        let local = TfmPath::local("/tmp/a.txt");
        coordinator.invalidate(&[local], "mutation");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = BackendCache::new(10, Duration::from_secs(60));
        cache.put("S3", "stat", "/b/k", CacheValue::Stat(Stat::file(10, 0)));
        assert!(matches!(cache.get("S3", "stat", "/b/k"), Some(CacheValue::Stat(_))));
    }

    #[test]
    fn invalidate_key_drops_entry() {
        let cache = BackendCache::new(10, Duration::from_secs(60));
        cache.put("S3", "stat", "/b/k", CacheValue::Stat(Stat::file(10, 0)));
        cache.invalidate_key("S3", "/b/k");
        assert!(cache.get("S3", "stat", "/b/k").is_none());
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let cache = BackendCache::new(1, Duration::from_secs(60));
        cache.put("S3", "stat", "/b/a", CacheValue::Stat(Stat::file(1, 0)));
        cache.put("S3", "stat", "/b/b", CacheValue::Stat(Stat::file(2, 0)));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("S3", "stat", "/b/a").is_none());
    }
}
