//! Short-lived cache of successful source results
//!
//! Registry answers change slowly, and investigators often re-run the same
//! subject within minutes. Only `Success` results are stored; failures are
//! always retried on the next lookup.

use crate::types::LookupResult;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedResult {
    result: LookupResult,
    expires_at: Instant,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    inserts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub inserts: u64,
}

/// LRU + TTL cache keyed by `source:digits`
pub struct LookupCache {
    entries: Mutex<LruCache<String, CachedResult>>,
    ttl: Duration,
    counters: Counters,
}

impl LookupCache {
    /// A zero capacity is treated as one entry
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            counters: Counters::default(),
        }
    }

    fn key(source: &str, digits: &str) -> String {
        format!("{}:{}", source, digits)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, source: &str, digits: &str) -> Option<LookupResult> {
        let key = Self::key(source, digits);
        let mut entries = self.entries.lock();

        let fresh = entries
            .get(&key)
            .map(|entry| (!entry.is_expired()).then(|| entry.result.clone()));

        match fresh {
            Some(Some(result)) => {
                debug!(source, "Lookup cache hit");
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Some(None) => {
                debug!(source, "Lookup cache entry expired");
                entries.pop(&key);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result; anything but `Success` is ignored
    pub fn insert(&self, digits: &str, result: &LookupResult) -> bool {
        if !result.is_success() {
            return false;
        }

        let key = Self::key(result.source(), digits);
        let mut entries = self.entries.lock();
        if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(
            key,
            CachedResult {
                result: result.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop every entry for one subject
    pub fn invalidate_subject(&self, digits: &str) -> usize {
        let suffix = format!(":{}", digits);
        let mut entries = self.entries.lock();
        let keys: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.ends_with(&suffix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Payload;

    const CNPJ: &str = "11222333000181";

    fn success(source: &str) -> LookupResult {
        LookupResult::success(source, "api", Payload::new(), 5)
    }

    #[test]
    fn test_only_successes_are_stored() {
        let cache = LookupCache::new(10, Duration::from_secs(60));

        assert!(cache.insert(CNPJ, &success("receita_cnpj")));
        assert!(!cache.insert(CNPJ, &LookupResult::credentials_missing("serasa")));
        assert!(!cache.insert(CNPJ, &LookupResult::timeout("car_sicar")));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("receita_cnpj", CNPJ).is_some());
        assert!(cache.get("serasa", CNPJ).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_entries_expire() {
        let cache = LookupCache::new(10, Duration::from_millis(20));
        cache.insert(CNPJ, &success("receita_cnpj"));

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("receita_cnpj", CNPJ).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_counted() {
        let cache = LookupCache::new(2, Duration::from_secs(60));
        cache.insert(CNPJ, &success("a"));
        cache.insert(CNPJ, &success("b"));
        cache.insert(CNPJ, &success("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", CNPJ).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_subject() {
        let cache = LookupCache::new(10, Duration::from_secs(60));
        cache.insert(CNPJ, &success("a"));
        cache.insert(CNPJ, &success("b"));
        cache.insert("52998224725", &success("a"));

        assert_eq!(cache.invalidate_subject(CNPJ), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear(), 1);
    }
}
