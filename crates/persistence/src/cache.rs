//! Per-key TTL cache backing the OAuth2 token store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::repositories::TokenCache;
use domain::CacheError;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Concurrent cache with one shard lock per key range; no global lock.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        purged
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
