use dashmap::DashMap;
use extract::ProcessedMessage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Processed messages keyed by a hash of the request that produced them.
pub struct Cache {
    processed: Arc<DashMap<String, ProcessedMessage>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Cache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            processed: Arc::new(DashMap::new()),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, request: &str) -> Option<ProcessedMessage> {
        let found = self
            .processed
            .get(&hash_text(request))
            .map(|r| r.value().clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn set(&self, request: &str, message: ProcessedMessage) {
        if self.max_entries == 0 {
            return;
        }
        if self.processed.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .processed
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.processed.remove(&key);
            }
        }
        self.processed.insert(hash_text(request), message);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.processed.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> ProcessedMessage {
        extract::Extractor::default().process_text(text, &[])
    }

    #[test]
    fn test_round_trip_and_counters() {
        let cache = Cache::new(10);
        assert!(cache.get("req").is_none());

        cache.set("req", message("hello"));
        assert_eq!(cache.get("req").unwrap().cleaned_text, "hello");

        let stats = cache.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    }

    #[test]
    fn test_eviction_keeps_bound() {
        let cache = Cache::new(4);
        for i in 0..10 {
            cache.set(&format!("req-{i}"), message("x"));
        }
        assert!(cache.stats().entries <= 4);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = Cache::new(0);
        cache.set("req", message("x"));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = hash_text("abc");
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
