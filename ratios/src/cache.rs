//! Ratio caching with a refresh interval.

use std::sync::Arc;

use chrono::Duration;
use indexswap_common::{RatioSet, Timestamp};
use parking_lot::RwLock;
use tracing::debug;

/// Mutable part of the cache, swapped as a unit.
#[derive(Debug, Clone, Default)]
struct CacheState {
    current: Option<RatioSet>,
    last_fetch: Option<Timestamp>,
}

/// Holds the last good ratio set and decides when a refresh is due.
///
/// Staleness only controls whether a refresh is attempted; [`snapshot`]
/// keeps serving the last good set however old it is.
///
/// [`snapshot`]: RatioCache::snapshot
#[derive(Debug)]
pub struct RatioCache {
    state: RwLock<CacheState>,
    refresh_interval: Duration,
}

impl RatioCache {
    /// Create an empty cache.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            refresh_interval,
        }
    }

    /// Create a cache pre-seeded with `seed`.
    ///
    /// Seeding is not a fetch: the cache stays stale until the first
    /// successful refresh.
    pub fn seeded(seed: RatioSet, refresh_interval: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState {
                current: Some(seed),
                last_fetch: None,
            }),
            refresh_interval,
        }
    }

    /// Whether a refresh is due at `now`.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        match self.state.read().last_fetch {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.refresh_interval,
        }
    }

    /// The last good ratio set, regardless of staleness.
    pub fn snapshot(&self) -> Option<RatioSet> {
        self.state.read().current
    }

    /// Replace the cached set and record the fetch time.
    pub fn update(&self, ratios: RatioSet, now: Timestamp) {
        let mut state = self.state.write();
        state.current = Some(ratios);
        state.last_fetch = Some(now);
        debug!(ratios = %ratios, fetched_at = %now, "Ratio cache updated");
    }

    /// When the cache was last filled by a successful fetch.
    pub fn last_fetch_time(&self) -> Option<Timestamp> {
        self.state.read().last_fetch
    }

    /// Configured refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Get cache statistics.
    pub fn stats(&self, now: Timestamp) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            populated: state.current.is_some(),
            fetched: state.last_fetch.is_some(),
            age: state.last_fetch.map(|last| now.signed_duration_since(last)),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub populated: bool,
    pub fetched: bool,
    pub age: Option<Duration>,
}

/// Shared ratio cache.
pub type SharedRatioCache = Arc<RatioCache>;
