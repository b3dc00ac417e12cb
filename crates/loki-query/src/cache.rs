//! TTL cache for label discovery results.
//!
//! Entries expire lazily: an expired read is a miss and evicts the entry.
//! Keys carry the window expressions as the caller wrote them, so a
//! relative window such as `1h` hits the same entry until the TTL lapses.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::types::TimeWindow;

/// Default time-to-live for cached label lists.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Identifies a cached label lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Label whose values were listed, or `None` for the label-name list.
    pub label: Option<String>,
    /// Start expression, trimmed; `None` when absent or blank.
    pub start: Option<String>,
    /// End expression, trimmed; `None` when absent or blank.
    pub end: Option<String>,
}

impl CacheKey {
    /// Builds a key for `label` over the unresolved `window`.
    #[must_use]
    pub fn new(label: Option<&str>, window: &TimeWindow) -> Self {
        Self {
            label: label.map(str::to_string),
            start: expression(window.start.as_deref()),
            end: expression(window.end.as_deref()),
        }
    }
}

fn expression(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
struct Entry {
    values: Vec<String>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries held, expired or not.
    pub total: usize,
    /// Entries still valid.
    pub valid: usize,
    /// Entries past their TTL but not yet evicted.
    pub expired: usize,
    /// Default TTL, seconds.
    pub ttl_secs: u64,
}

/// Thread-safe TTL cache of label lists.
#[derive(Debug)]
pub struct LabelCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl LabelCache {
    /// Creates a cache with the given default TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Default TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached values, or `None` on a miss.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Vec<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.values.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            debug!(?key, "evicting expired cache entry");
            entries.remove(key);
        }
        None
    }

    /// Stores values under `key`, replacing any previous entry.
    pub fn put(&self, key: CacheKey, values: Vec<String>, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.ttl);
        self.entries.write().insert(key, Entry { values, expires_at });
    }

    /// Removes one entry.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of entries held, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
