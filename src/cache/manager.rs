//! Response cache: TTL policy and statistics over a [`CacheBackend`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{CacheBackend, MemoryCache, NullCache};
use super::key::CacheKey;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expired_purged: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    expired_purged: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_purged: self.expired_purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Fingerprint-keyed store of generated text.
///
/// Backend failures are counted and logged, then treated as a miss (on lookup) or a
/// skipped write (on store); they never reach the caller.
pub struct ResponseCache {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    /// Memory-backed cache sized from `config`, or a null cache when disabled.
    pub fn from_config(config: CacheConfig) -> Self {
        let backend: Box<dyn CacheBackend> = if config.enabled {
            Box::new(MemoryCache::new(config.max_entries))
        } else {
            Box::new(NullCache::new())
        };
        Self::new(config, backend)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(text)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = key.short(), "cache hit");
                Some(text)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = key.short(), "cache miss");
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    cache_key = key.short(),
                    backend = self.backend.name(),
                    error = %e,
                    "cache lookup failed"
                );
                None
            }
        }
    }

    /// Like [`ResponseCache::lookup`] but leaves hit/miss counters untouched.
    pub async fn peek(&self, key: &CacheKey) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        self.backend.get(key).await.ok().flatten()
    }

    /// Insert or overwrite with expiry `now + ttl`.
    pub async fn store(&self, key: &CacheKey, text: &str) {
        if !self.config.enabled {
            return;
        }
        match self.backend.set(key, text, self.config.ttl).await {
            Ok(evicted) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                if evicted {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    cache_key = key.short(),
                    backend = self.backend.name(),
                    error = %e,
                    "cache store failed"
                );
            }
        }
    }

    /// Remove expired entries now instead of waiting for a lookup to find them.
    pub async fn sweep(&self) -> usize {
        match self.backend.purge_expired().await {
            Ok(n) => {
                self.stats
                    .expired_purged
                    .fetch_add(n as u64, Ordering::Relaxed);
                if n > 0 {
                    debug!(purged = n, "cache sweep");
                }
                n
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "cache sweep failed");
                0
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "cache clear failed");
        }
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish()
    }
}
