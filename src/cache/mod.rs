//! Query result caching.
//!
//! The engine treats the cache as an opaque memoization layer: it reads
//! before each per-IP lookup, writes after, and clears everything once a
//! fully successful refresh cycle has put new databases live. Cached values
//! are the serialized query JSON; `null` encodes a cached negative result so
//! "no data for this IP" is memoized too.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// Cache key for one query: `"<ip>:<full_data>"`.
pub fn cache_key(ip: &str, full_data: bool) -> String {
    format!("{}:{}", ip, full_data)
}

/// Contract the engine requires from any cache backend.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Fetches a previously stored value, if present and still valid.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores a value under `key`.
    async fn set(&self, key: &str, value: Value);

    /// Drops every entry. Invoked after databases are refreshed so stale
    /// results are not served against new data.
    async fn clear_all(&self);
}

/// In-memory cache with per-entry TTL and lazy expiry.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Value, Instant)>>,
    ttl: Duration,
}

impl MemoryCache {
    /// Creates a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        log::info!("Initialized memory cache (ttl: {:?})", ttl);
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl QueryCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expiry)) if Instant::now() < *expiry => {
                    return Some(value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict under the write lock.
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: Value) {
        let expiry = Instant::now() + self.ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expiry));
    }

    async fn clear_all(&self) {
        self.entries.write().await.clear();
        log::info!("Cleared memory cache");
    }
}

/// No-op cache for deployments that do their own caching (or none).
pub struct NoCache;

#[async_trait]
impl QueryCache for NoCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value) {}

    async fn clear_all(&self) {}
}
