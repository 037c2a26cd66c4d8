//! TTL key/value store
//!
//! Entries hold the serialized JSON body of a response. Expiry is derived
//! from the entry's own timestamp and TTL, so nothing has to run in the
//! background to keep the cache honest.

use crate::key::CacheKey;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// TTL applied by [`ChainCache::set`]
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A single cached response body
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized JSON body
    pub body: String,

    /// When the entry was written
    pub cached_at: Instant,

    /// How long the entry stays valid
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry is past its TTL at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) > self.ttl
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.cached_at))
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently stored (expired ones included until reaped)
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`, zero before the first lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-process response cache
///
/// Lives as long as the process (or until [`ChainCache::clear_all`]).
/// Share it between clients behind an `Arc<Mutex<_>>`.
#[derive(Debug)]
pub struct ChainCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
}

impl Default for ChainCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ChainCache {
    /// Create an empty cache with the given default TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// TTL used when `set` is called without an explicit one
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a value
    ///
    /// Expired entries are removed and reported as a miss. A body that no
    /// longer deserializes into `T` is treated the same way.
    pub fn get<T: DeserializeOwned>(&mut self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let now = Instant::now();

        let expired = match self.entries.get(&key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            debug!("Cache entry expired: {}", key);
            self.entries.remove(&key);
            self.misses += 1;
            return None;
        }

        let parsed = self
            .entries
            .get(&key)
            .map(|entry| serde_json::from_str::<T>(&entry.body));

        match parsed {
            Some(Ok(value)) => {
                self.hits += 1;
                Some(value)
            }
            Some(Err(e)) => {
                debug!("Dropping unreadable cache entry {}: {}", key, e);
                self.entries.remove(&key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a value with the default TTL
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: &CacheKey,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// Store a value with an explicit TTL
    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &mut self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), serde_json::Error> {
        let body = serde_json::to_string(value)?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                body,
                cached_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    /// Whether a live (non-expired) entry exists, without touching counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .get(&key.to_string())
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Remove a single entry, returning whether it existed
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(&key.to_string()).is_some()
    }

    /// Remove every entry whose key starts with `prefix`
    ///
    /// `"issue:42:"` drops all issues of project 42, `"epic:"` all epics.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        debug!(
            "Invalidated {} cache entries with prefix '{}'",
            removed, prefix
        );
        removed
    }

    /// Remove all expired entries and return how many were dropped
    pub fn clear_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    /// Drop everything, including the hit/miss counters
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
