use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::models::RawResponse;

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub response: RawResponse,
    pub created_at: Instant,
}

// Create a cache key (hash of model + prompt + schema)
pub fn make_cache_key(model: &str, prompt: &str, schema: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(prompt.as_bytes());
    hasher.update(schema.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Raw extraction responses kept for `ttl`. Consulted before a remote call
/// is admitted, so a hit costs no rate budget. Callers store only responses
/// that passed validation.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<RawResponse> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.response.clone());

        match hit {
            Some(response) => {
                CACHE_HITS.inc();
                debug!("extraction cache hit");
                Some(response)
            }
            None => {
                CACHE_MISSES.inc();
                None
            }
        }
    }

    /// Store `response` and drop every entry older than the TTL.
    pub fn store(&self, key: String, response: RawResponse) {
        self.entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        self.entries.insert(
            key,
            CacheEntry {
                response,
                created_at: Instant::now(),
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(text: &str) -> RawResponse {
        RawResponse { text: text.into() }
    }

    #[test]
    fn key_depends_on_model_prompt_and_schema() {
        let schema = json!({ "type": "object" });
        let key = make_cache_key("m", "a", &schema);

        assert_eq!(key, make_cache_key("m", "a", &schema));
        assert_ne!(key, make_cache_key("m", "b", &schema));
        assert_ne!(key, make_cache_key("m", "a", &json!({})));
        assert_ne!(key, make_cache_key("other", "a", &schema));
    }

    #[tokio::test(start_paused = true)]
    async fn serves_hits_until_ttl_expires() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        cache.store("k".into(), raw("first"));

        assert_eq!(cache.lookup("k"), Some(raw("first")));
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.lookup("k"), Some(raw("first")));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.lookup("k"), None);
        assert_eq!(cache.lookup("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_on_store() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        for i in 0..5 {
            cache.store(format!("article-{i}"), raw("x"));
        }
        assert_eq!(cache.len(), 5);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.store("fresh".into(), raw("y"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("fresh"), Some(raw("y")));
    }
}
