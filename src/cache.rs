//! In-memory response cache with TTL expiry and insertion-order eviction.
//!
//! Keyed by `"<query>|<conversation_id>"`. Eviction at capacity removes the
//! earliest-inserted entry; reads do not refresh an entry's position, so
//! this is FIFO by insertion, not LRU. Nothing persists across restarts.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;

/// A cached response payload plus its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: serde_json::Value,
    inserted_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Current number of live entries.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Configured TTL in milliseconds.
    pub ttl_ms: u64,
    /// Lifetime hit count.
    pub hits: u64,
    /// Lifetime miss count (includes expiries).
    pub misses: u64,
    /// Lifetime evictions (capacity plus TTL).
    pub evictions: u64,
}

/// Bounded TTL cache for agent response payloads.
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order; front = oldest, the next eviction victim.
    insertion_order: VecDeque<String>,
    ttl: Duration,
    max_size: usize,
    enabled: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ResponseCache {
    /// Creates a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize, enabled: bool) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            ttl,
            max_size,
            enabled,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Builds the cache key for a query scoped to a conversation.
    #[must_use]
    pub fn key(query: &str, conversation_id: &str) -> String {
        format!("{query}|{conversation_id}")
    }

    /// Looks up a key, returning the payload on a live hit.
    ///
    /// A stale entry is evicted as a side effect and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                self.hits += 1;
                Some(entry.data.clone())
            }
            Some(_) => {
                self.remove(key);
                self.evictions += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a payload, evicting the oldest entry when at capacity.
    ///
    /// No-op when caching is disabled. Re-inserting an existing key
    /// refreshes its payload and timestamp but keeps its queue position.
    pub fn set(&mut self, key: String, data: serde_json::Value) {
        if !self.enabled || self.max_size == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(
                key,
                CacheEntry {
                    data,
                    inserted_at: Instant::now(),
                },
            );
            return;
        }
        if self.entries.len() >= self.max_size
            && let Some(oldest) = self.insertion_order.pop_front()
        {
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                data,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops all entries. Counters are preserved.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            enabled: self.enabled,
            ttl_ms: u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.insertion_order.retain(|k| k != key);
    }
}
