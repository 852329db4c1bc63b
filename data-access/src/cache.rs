//! Process-local response cache keyed by string.
//!
//! Entries expire lazily: an entry older than its TTL is removed by the read
//! that finds it. Nothing sweeps the map in the background.

use jiff::{SignedDuration, Timestamp};
use regex::Regex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::time::TimeSource;

pub const DEFAULT_TTL: SignedDuration = SignedDuration::from_secs(5 * 60);

struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    timestamp: Timestamp,
    ttl: SignedDuration,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: SignedDuration,
    time_source: TimeSource,
}

impl QueryCache {
    pub fn new(time_source: TimeSource) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: DEFAULT_TTL,
            time_source,
        }
    }

    pub fn with_default_ttl(mut self, ttl: SignedDuration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> SignedDuration {
        self.default_ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set<T: Send + Sync + 'static>(
        &self,
        key: impl Into<String>,
        value: T,
    ) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl<T: Send + Sync + 'static>(
        &self,
        key: impl Into<String>,
        value: T,
        ttl: SignedDuration,
    ) {
        let entry = CacheEntry {
            data: Arc::new(value),
            timestamp: self.time_source.now(),
            ttl,
        };
        self.entries().insert(key.into(), entry);
    }

    /// Returns a clone of the live value stored under `key`.
    ///
    /// Expired entries are removed and read as a miss. A value stored under a
    /// different type also reads as a miss but is left in place.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries();
        let Some(entry) = entries.get(key) else {
            tracing::debug!(key, "cache miss");
            return None;
        };

        if self.time_source.age_of(entry.timestamp) > entry.ttl {
            tracing::debug!(key, "cache entry expired");
            entries.remove(key);
            return None;
        }

        let value = entry.data.downcast_ref::<T>().cloned();
        if value.is_some() {
            tracing::debug!(key, "cache hit");
        } else {
            tracing::warn!(key, "cache entry holds a different type");
        }
        value
    }

    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Drop every key matched by `pattern`. Returns how many were removed.
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        before - entries.len()
    }

    /// Remove one key, or everything when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        match key {
            Some(key) => self.invalidate(key),
            None => self.entries().clear(),
        }
    }

    /// Physical entry count, including expired entries nobody has read yet.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }
}
