//! Per-principal effective-permission cache
//!
//! Entries expire after a TTL (15 minutes by default) and can be invalidated
//! explicitly when grants change. Expiry is checked on read, so a stale entry
//! costs nothing until someone asks for it.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache tuning knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
            capacity: 10_000,
        }
    }
}

#[derive(Clone)]
struct CachedPermissions {
    permissions: Arc<HashSet<String>>,
    cached_at: Instant,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}

/// TTL cache of effective permission sets keyed by principal id
pub struct PermissionCache {
    entries: DashMap<String, CachedPermissions>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl PermissionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Fetch the cached set for a principal, dropping it if the TTL elapsed.
    pub fn get(&self, principal_id: &str) -> Option<Arc<HashSet<String>>> {
        let entry = match self.entries.get(principal_id) {
            Some(e) => e.clone(),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if entry.cached_at.elapsed() >= self.config.ttl {
            drop(self.entries.remove(principal_id));
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(principal_id, "permission cache entry expired");
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.permissions)
    }

    pub fn insert(&self, principal_id: &str, permissions: HashSet<String>) {
        if self.entries.len() >= self.config.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            principal_id.to_string(),
            CachedPermissions {
                permissions: Arc::new(permissions),
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop a principal's entry. Returns whether anything was removed.
    pub fn invalidate(&self, principal_id: &str) -> bool {
        let removed = self.entries.remove(principal_id).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(principal_id, "permission cache entry invalidated");
        }
        removed
    }

    /// Drop every entry. Used when a role or grant mutation affects an
    /// unknown set of principals.
    pub fn clear(&self) {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Evict roughly the oldest tenth of entries to make room.
    fn evict_oldest(&self) {
        let mut ages: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().cached_at))
            .collect();
        ages.sort_by_key(|(_, at)| *at);
        let take = (ages.len() / 10).max(1);
        for (key, _) in ages.into_iter().take(take) {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}
