//! Evicts expired OAuth2 tokens from the in-memory cache.

use std::sync::Arc;

use domain::GatewayError;
use metrics::gauge;
use persistence::InMemoryTokenCache;
use tracing::debug;

use super::scheduler::{Job, JobFrequency};

pub struct TokenCachePurgeJob {
    cache: Arc<InMemoryTokenCache>,
}

impl TokenCachePurgeJob {
    pub fn new(cache: Arc<InMemoryTokenCache>) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl Job for TokenCachePurgeJob {
    fn name(&self) -> &'static str {
        "token_cache_purge"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(5)
    }

    async fn execute(&self) -> Result<(), GatewayError> {
        let purged = self.cache.purge_expired();
        let remaining = self.cache.len();
        gauge!("oauth2_token_cache_entries").set(remaining as f64);
        debug!(purged, remaining, "Token cache purged");
        Ok(())
    }
}
