//! Self-populating cache of OpenID discovery results.
//!
//! Discovery is slow (it fetches and parses documents from the provider) and
//! happens twice per sign-in: once to build the request and again on the
//! callback to recover the endpoint. Results are cached per identifier for a
//! fixed TTL, including negative results, so a bad identifier does not cause
//! a discovery storm.
//!
//! Each identifier maps to a slot holding a [`tokio::sync::OnceCell`]. The
//! first caller for a slot runs discovery; concurrent callers for the same
//! identifier wait on the cell rather than the map, so the map lock is only
//! held long enough to find or replace a slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OnceCell};

use super::consumer::{DiscoveredEndpoint, OpenIdConsumer};

/// Configuration for the discovery cache.
#[derive(Debug, Clone)]
pub struct DiscoveryCacheConfig {
    /// Time-to-live for cached results (default: 5 minutes).
    pub ttl: Duration,
    /// Entry count at which a miss first sweeps out expired entries
    /// (default: 1024). The next sweep happens at twice the surviving count.
    pub prune_threshold: usize,
}

impl Default for DiscoveryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            prune_threshold: 1024,
        }
    }
}

impl DiscoveryCacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the entry count that triggers a sweep of expired entries.
    #[must_use]
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold.max(1);
        self
    }
}

/// Cached discovery outcome.
struct CachedDiscovery {
    /// Discovered endpoints, `None` when discovery failed or found nothing.
    endpoints: Option<Arc<[DiscoveredEndpoint]>>,
    /// When discovery completed.
    fetched_at: Instant,
}

type Slot = OnceCell<CachedDiscovery>;

struct Slots {
    map: HashMap<String, Arc<Slot>>,
    /// Map size at which the next insert sweeps expired slots.
    prune_at: usize,
}

/// Identifier to endpoint list cache.
pub struct DiscoveryCache {
    consumer: Arc<dyn OpenIdConsumer>,
    entries: Mutex<Slots>,
    config: DiscoveryCacheConfig,
}

impl DiscoveryCache {
    /// Creates an empty cache that discovers through `consumer`.
    #[must_use]
    pub fn new(consumer: Arc<dyn OpenIdConsumer>, config: DiscoveryCacheConfig) -> Self {
        Self {
            consumer,
            entries: Mutex::new(Slots {
                map: HashMap::new(),
                prune_at: config.prune_threshold.max(1),
            }),
            config,
        }
    }

    /// The configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Returns the endpoints for `identifier`, running discovery on a miss.
    ///
    /// `None` means discovery failed or found no endpoint; that answer is
    /// cached for the TTL like any other.
    pub async fn resolve(&self, identifier: &str) -> Option<Arc<[DiscoveredEndpoint]>> {
        let slot = {
            let mut entries = self.entries.lock().await;
            match entries.map.get(identifier) {
                Some(slot) if !self.is_expired(slot) => Arc::clone(slot),
                _ => {
                    if entries.map.len() >= entries.prune_at {
                        self.prune(&mut entries);
                    }
                    let slot = Arc::new(Slot::new());
                    entries.map.insert(identifier.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };

        let cached = slot.get_or_init(|| self.discover(identifier)).await;
        cached.endpoints.clone()
    }

    async fn discover(&self, identifier: &str) -> CachedDiscovery {
        tracing::debug!(identifier = %identifier, "Running OpenID discovery");

        let endpoints = match self.consumer.discover(identifier).await {
            Ok(list) if !list.is_empty() => Some(Arc::from(list)),
            Ok(_) => {
                tracing::info!(identifier = %identifier, "OpenID discovery found no endpoints");
                None
            }
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "OpenID discovery failed");
                None
            }
        };

        CachedDiscovery {
            endpoints,
            fetched_at: Instant::now(),
        }
    }

    /// Drops expired slots. Runs on the miss path once the map has grown to
    /// `prune_at`, so identifiers that are never asked for again still leave.
    fn prune(&self, entries: &mut Slots) {
        let before_count = entries.map.len();
        entries.map.retain(|_, slot| !self.is_expired(slot));
        entries.prune_at = (entries.map.len() * 2).max(self.config.prune_threshold.max(1));

        tracing::debug!(
            removed = before_count - entries.map.len(),
            remaining = entries.map.len(),
            "Pruned expired OpenID discovery entries"
        );
    }

    /// An in-flight slot is never expired.
    fn is_expired(&self, slot: &Slot) -> bool {
        slot.get()
            .is_some_and(|c| c.fetched_at.elapsed() >= self.config.ttl)
    }

    /// Invalidates a cached entry.
    pub async fn invalidate(&self, identifier: &str) {
        self.entries.lock().await.map.remove(identifier);
        tracing::debug!(identifier = %identifier, "Invalidated OpenID discovery entry");
    }

    /// Clears all expired entries from the cache.
    pub async fn cleanup(&self) {
        let mut entries = self.entries.lock().await;
        let before_count = entries.map.len();

        entries.map.retain(|_, slot| !self.is_expired(slot));

        let removed = before_count - entries.map.len();
        if removed > 0 {
            tracing::debug!("Cleaned up {} expired OpenID discovery entries", removed);
        }
    }

    /// Clears all entries from the cache.
    pub async fn clear(&self) {
        self.entries.lock().await.map.clear();
        tracing::debug!("Cleared all OpenID discovery entries");
    }

    /// Returns the number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.map.is_empty()
    }
}
