use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use extract::{GenerationRequest, Generator};

/// Generation replies keyed by request, scoped to one batch run.
pub struct ResponseCache {
    replies: DashMap<String, String>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            replies: DashMap::new(),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, request: &GenerationRequest) -> Option<String> {
        let found = self.replies.get(&Self::key(request)).map(|r| r.value().clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, request: &GenerationRequest, reply: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.replies.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .replies
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.replies.remove(&key);
            }
        }
        self.replies.insert(Self::key(request), reply);
    }

    fn key(request: &GenerationRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update([u8::from(request.json_mode)]);
        hasher.update(request.max_tokens.to_le_bytes());
        for message in &request.messages {
            hasher.update(message.role.as_bytes());
            hasher.update([0]);
            hasher.update(message.content.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.replies.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry; counters keep running for the whole process.
    pub fn clear(&self) {
        self.replies.clear();
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Read-through cache in front of a generation service.
pub struct CachedGenerator {
    inner: Arc<dyn Generator>,
    cache: Arc<ResponseCache>,
}

impl CachedGenerator {
    pub fn new(inner: Arc<dyn Generator>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl Generator for CachedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if let Some(reply) = self.cache.get(request) {
            tracing::debug!("generation cache hit");
            return Ok(reply);
        }
        let reply = self.inner.generate(request).await?;
        self.cache.insert(request, reply.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::Message;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Generator for Counting {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            let n = self.0.fetch_add(1, Ordering::Relaxed);
            Ok(format!("{}#{n}", request.messages[0].content))
        }
    }

    fn request(content: &str) -> GenerationRequest {
        GenerationRequest::new(vec![Message::user(content)], true)
    }

    #[tokio::test]
    async fn test_read_through() {
        let cache = Arc::new(ResponseCache::new(10));
        let generator = CachedGenerator::new(Arc::new(Counting(AtomicUsize::new(0))), cache.clone());

        assert_eq!(generator.generate(&request("a")).await.unwrap(), "a#0");
        assert_eq!(generator.generate(&request("a")).await.unwrap(), "a#0");
        assert_eq!(generator.generate(&request("b")).await.unwrap(), "b#1");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 2, 2));

        cache.clear();
        assert_eq!(generator.generate(&request("a")).await.unwrap(), "a#2");
    }

    #[test]
    fn test_json_mode_is_part_of_the_key() {
        let cache = ResponseCache::new(10);
        cache.insert(&request("a"), "json".into());
        let plain = GenerationRequest::new(vec![Message::user("a")], false);
        assert!(cache.get(&plain).is_none());
    }

    #[test]
    fn test_eviction_bounds_size() {
        let cache = ResponseCache::new(4);
        for i in 0..10 {
            cache.insert(&request(&i.to_string()), String::new());
        }
        assert!(cache.stats().entries <= 4);
    }
}
