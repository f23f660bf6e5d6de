//! Application-wide backend registry.
//!
//! Paths carry only a [`Scheme`] and a key into this registry, so
//! `TfmPath` values stay cheap to clone and pass around the UI layer;
//! the actual SSH session or S3 client lives here, pooled per host or
//! bucket for the life of the process.

use super::error::PathResult;
use super::s3::S3Backend;
use super::ssh::{SshBackend, SshConnectionPool};
use crate::cache::BackendCache;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct BackendRegistry {
    ssh_pool: SshConnectionPool,
    s3_clients: RwLock<HashMap<String, Arc<S3Backend>>>,
    /// Shared with every remote backend reached through this registry, so
    /// `iterdir`/`stat` calls populate and consult the same cache the
    /// coordinator invalidates against. `None` in tests that construct a
    /// registry without a cache wired in.
    cache: RwLock<Option<Arc<BackendCache>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<BackendCache>) -> Self {
        let registry = Self::default();
        *registry.cache.write().unwrap() = Some(cache);
        registry
    }

    pub fn set_cache(&self, cache: Arc<BackendCache>) {
        *self.cache.write().unwrap() = Some(cache);
    }

    pub fn cache(&self) -> Option<Arc<BackendCache>> {
        self.cache.read().unwrap().clone()
    }

    pub fn ssh_backend(&self, alias: &str) -> PathResult<Arc<SshBackend>> {
        self.ssh_pool.get_or_connect(alias)
    }

    pub fn s3_backend(&self, bucket: &str) -> PathResult<Arc<S3Backend>> {
        {
            let clients = self.s3_clients.read().unwrap();
            if let Some(client) = clients.get(bucket) {
                return Ok(client.clone());
            }
        }
        let backend = Arc::new(S3Backend::connect(bucket)?);
        self.s3_clients.write().unwrap().insert(bucket.to_string(), backend.clone());
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_registry_has_no_cache() {
        let registry = BackendRegistry::new();
        assert!(registry.cache().is_none());
    }

    #[test]
    fn with_cache_and_set_cache_are_visible_through_cache() {
        let cache = Arc::new(BackendCache::new(10, Duration::from_secs(60)));
        let registry = BackendRegistry::with_cache(cache.clone());
        assert!(registry.cache().is_some());

        let other = BackendRegistry::new();
        assert!(other.cache().is_none());
        other.set_cache(cache);
        assert!(other.cache().is_some());
    }
}
