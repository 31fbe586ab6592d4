//! TTL-keyed semantic response cache.
//!
//! Keys are stable hashes over the normalized request (see
//! [`crate::query::cache_key`]), so near-identical phrasings of the same
//! request share one entry. Every read and mutation is serialized through a
//! single coarse lock owned by the cache instance; entries expire lazily on
//! read and are swept by [`SemanticCache::cleanup_expired`].

use crate::types::{Evidence, SourceType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Fixed per-entry footprint used for the memory estimate.
const ENTRY_SIZE_ESTIMATE_BYTES: u64 = 2_048;

/// Response metadata stored alongside cached evidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedMetadata {
    pub total_found: usize,
    pub avg_relevance_score: f32,
    pub source_distribution: HashMap<SourceType, usize>,
    pub source_latencies: HashMap<SourceType, u64>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub evidence: Vec<Evidence>,
    pub metadata: CachedMetadata,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// Cache counters exposed through the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub invalidations: u64,
    pub approx_memory_bytes: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// In-memory TTL cache of retrieval responses.
pub struct SemanticCache {
    inner: Mutex<CacheInner>,
    default_ttl: Duration,
    max_entries: usize,
}

impl SemanticCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a cached response, lazily evicting it when expired.
    pub fn get(&self, key: &str) -> Option<(Vec<Evidence>, CachedMetadata)> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            debug!(key, "evicted expired cache entry on read");
            return None;
        }

        inner.hits += 1;
        let entry = &inner.entries[key];
        Some((entry.evidence.clone(), entry.metadata.clone()))
    }

    /// Store a response with the default or an overridden TTL.
    pub fn set(
        &self,
        key: String,
        evidence: Vec<Evidence>,
        metadata: CachedMetadata,
        ttl_override: Option<Duration>,
    ) {
        let now = Instant::now();
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            key: key.clone(),
            evidence,
            metadata,
            created_at: now,
            expires_at: now + ttl,
        };

        let mut inner = self.inner.lock();
        inner.entries.insert(key, entry);

        if inner.entries.len() > self.max_entries {
            inner.entries.retain(|_, e| e.expires_at > now);
        }
        while inner.entries.len() > self.max_entries {
            let oldest = inner
                .entries
                .values()
                .min_by_key(|e| e.created_at)
                .map(|e| e.key.clone());
            match oldest {
                Some(key) => {
                    inner.entries.remove(&key);
                    debug!(key = %key, "evicted oldest cache entry over capacity");
                }
                None => break,
            }
        }
    }

    /// Clear cached responses.
    ///
    /// Entries carry no per-source partitioning, so a scoped request still
    /// clears the full map; the argument is accepted for interface
    /// compatibility and logged.
    pub fn invalidate(&self, source_type: Option<SourceType>) -> usize {
        let mut inner = self.inner.lock();
        if let Some(source) = source_type {
            debug!(%source, "scoped invalidation requested, clearing full cache");
        }
        let cleared = inner.entries.len();
        inner.entries.clear();
        inner.invalidations += 1;
        cleared
    }

    /// Sweep every expired entry; returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
            invalidations: inner.invalidations,
            approx_memory_bytes: inner.entries.len() as u64 * ENTRY_SIZE_ESTIMATE_BYTES,
        }
    }

    /// Run `cleanup_expired` on an interval until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = cache.cleanup_expired();
                if swept > 0 {
                    debug!(swept, "swept expired cache entries");
                }
            }
        })
    }
}
