//! LRU + TTL cache for contexts and fragment lists.
//!
//! Owned by one [`crate::ContextManager`] behind its mutex; there is no
//! process-wide instance. Keys are SHA-256 digests of the operation, the
//! document and the options, so equal inputs hit regardless of which caller
//! asked. Entries expire after the configured TTL; at capacity, an expired
//! entry is evicted first, otherwise the least recently used one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use specweave_core::SpecDocument;
use specweave_settings::CacheSettings;

use crate::context::ProcessingContext;
use crate::errors::Result;
use crate::types::ContextFragment;

/// Digest of `(operation, document, options)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: [u8; 32],
}

impl CacheKey {
    /// Key for `operation` over `document` with `options`.
    pub fn new<O: Serialize + ?Sized>(
        operation: &str,
        document: &SpecDocument,
        options: &O,
    ) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update(b"|");
        hasher.update(serde_json::to_vec(document)?);
        hasher.update(b"|");
        hasher.update(serde_json::to_vec(options)?);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());
        Ok(Self { hash })
    }
}

/// A cached result.
#[derive(Clone, Debug)]
pub enum CachedValue {
    /// A whole-document context.
    Context(ProcessingContext),
    /// A chunked fragment list.
    Fragments(Vec<ContextFragment>),
}

impl CachedValue {
    /// Serialized size, used as the memory estimate.
    fn approximate_bytes(&self) -> usize {
        let len = match self {
            Self::Context(context) => serde_json::to_vec(context).map(|v| v.len()),
            Self::Fragments(fragments) => serde_json::to_vec(fragments).map(|v| v.len()),
        };
        len.unwrap_or(0)
    }
}

/// Cache limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entry lifetime.
    pub ttl: Duration,
    /// Maximum number of entries.
    pub max_entries: usize,
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries: settings.max_entries,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Live entries.
    pub entry_count: usize,
    /// Sum of the serialized sizes of the entries.
    pub approximate_memory_bytes: usize,
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
}

struct CacheEntry {
    value: CachedValue,
    size_bytes: usize,
    expires_at: Instant,
}

/// LRU + TTL store of computed contexts and fragment lists.
pub struct ContextCache {
    entries: HashMap<CacheKey, CacheEntry>,
    access_order: Vec<CacheKey>,
    config: CacheConfig,
    hits: u64,
    misses: u64,
}

impl ContextCache {
    /// Empty cache with `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            access_order: Vec::new(),
            config,
            hits: 0,
            misses: 0,
        }
    }

    /// Live entry for `key`, marking it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<&CachedValue> {
        match self.entries.get(key) {
            Some(entry) if Instant::now() >= entry.expires_at => {
                drop(self.entries.remove(key));
                self.access_order.retain(|k| k != key);
                self.misses += 1;
                return None;
            }
            Some(_) => {}
            None => {
                self.misses += 1;
                return None;
            }
        }

        self.access_order.retain(|k| k != key);
        self.access_order.push(*key);
        self.hits += 1;
        self.entries.get(key).map(|e| &e.value)
    }

    /// Store `value` under `key`, evicting while at capacity.
    pub fn insert(&mut self, key: CacheKey, value: CachedValue) {
        self.access_order.retain(|k| *k != key);
        drop(self.entries.remove(&key));
        while !self.entries.is_empty() && self.entries.len() >= self.config.max_entries {
            self.evict_oldest();
        }

        let entry = CacheEntry {
            size_bytes: value.approximate_bytes(),
            value,
            expires_at: Instant::now() + self.config.ttl,
        };
        drop(self.entries.insert(key, entry));
        self.access_order.push(key);
    }

    /// Remove every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Remove expired entries.
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now < e.expires_at);
        let entries = &self.entries;
        self.access_order.retain(|k| entries.contains_key(k));
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            approximate_memory_bytes: self.entries.values().map(|e| e.size_bytes).sum(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn evict_oldest(&mut self) {
        // Prefer expired entries over LRU
        let now = Instant::now();
        let expired = self
            .entries
            .iter()
            .find(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| *k);

        if let Some(key) = expired {
            drop(self.entries.remove(&key));
            self.access_order.retain(|k| *k != key);
            return;
        }

        if !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            drop(self.entries.remove(&oldest));
        }
    }
}
