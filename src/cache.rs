//! Response cache keyed by the canonical request body.
//!
//! Entries expire after a fixed TTL. The cache is also bounded: once full,
//! inserting evicts the least recently used entry.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use serde_json::Value;
use tokio::time::Instant;

/// Canonical cache key for a request body.
///
/// `serde_json::Map` keeps keys sorted, so two bodies that differ only in key
/// order serialize to the same string.
pub(crate) fn cache_key(body: &Value) -> String {
    body.to_string()
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
pub(crate) struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns a live entry and marks it as most recently used.
    /// An expired entry is dropped and counts as a miss.
    pub(crate) fn get(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.created_at) >= self.ttl,
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            self.remove(key);
            self.misses += 1;
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, key.to_owned());
        self.hits += 1;
        Some(entry.value.clone())
    }

    pub(crate) fn insert(&mut self, key: String, value: Value, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        self.remove(&key);
        while self.entries.len() >= self.capacity {
            if !self.evict_one(now) {
                break;
            }
        }

        self.tick += 1;
        self.recency.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_used: self.tick,
            },
        );
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses
    }

    /// Drops every expired entry if there is one, otherwise the least
    /// recently used one. Returns false when the cache is empty.
    fn evict_one(&mut self, now: Instant) -> bool {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.created_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        if !expired.is_empty() {
            for key in expired {
                self.remove(&key);
            }
            return true;
        }

        match self.recency.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.last_used);
        }
    }
}
