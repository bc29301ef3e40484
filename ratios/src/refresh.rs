//! Refresh scheduling for the ratio cache.
//!
//! Refreshes happen on a fixed timer, lazily before serving a request, or
//! both. Every path goes through [`RefreshScheduler::refresh`], which
//! deduplicates concurrent attempts: while one fetch is running, later callers
//! wait on the same outcome instead of issuing their own request. The fetch
//! runs in its own task, so a caller that stops waiting does not cancel it.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexswap_common::{Clock, RatioSet};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::cache::SharedRatioCache;
use crate::error::{RatioError, RatioResult};
use crate::source::RatioSource;

/// When the cache gets refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Background task on a fixed interval.
    Timer,
    /// Before serving a request, if the cache is stale.
    OnAccess,
    /// Both of the above.
    Both,
}

impl RefreshPolicy {
    pub fn uses_timer(&self) -> bool {
        matches!(self, RefreshPolicy::Timer | RefreshPolicy::Both)
    }

    pub fn refreshes_on_access(&self) -> bool {
        matches!(self, RefreshPolicy::OnAccess | RefreshPolicy::Both)
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timer" => Ok(RefreshPolicy::Timer),
            "on-access" | "on_access" | "access" => Ok(RefreshPolicy::OnAccess),
            "both" => Ok(RefreshPolicy::Both),
            other => Err(format!("unknown refresh policy: {other}")),
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPolicy::Timer => f.write_str("timer"),
            RefreshPolicy::OnAccess => f.write_str("on-access"),
            RefreshPolicy::Both => f.write_str("both"),
        }
    }
}

/// Refresh counters.
#[derive(Debug, Default)]
pub struct RefreshStats {
    /// Fetches started.
    pub attempts: AtomicU64,
    /// Fetches that updated the cache.
    pub successes: AtomicU64,
    /// Fetches that failed.
    pub failures: AtomicU64,
}

impl RefreshStats {
    /// Take a point-in-time copy.
    pub fn snapshot(&self) -> RefreshStatsSnapshot {
        RefreshStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time refresh counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

type Outcome = RatioResult<RatioSet>;
type InFlight = Arc<Mutex<InFlightSlot>>;

/// The refresh currently running, tagged so a finished task only clears
/// its own entry.
#[derive(Default)]
struct InFlightSlot {
    generation: u64,
    current: Option<watch::Receiver<Option<Outcome>>>,
}

enum Flight {
    Cached(RatioSet),
    Pending(watch::Receiver<Option<Outcome>>),
}

/// Clears the in-flight slot when the fetch task ends, panics included.
struct InFlightGuard {
    slot: InFlight,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.generation == self.generation {
            slot.current = None;
        }
    }
}

/// Drives refreshes of a [`RatioCache`](crate::cache::RatioCache) from a [`RatioSource`].
#[derive(Clone)]
pub struct RefreshScheduler {
    source: Arc<dyn RatioSource>,
    cache: SharedRatioCache,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    /// Receiver for the refresh currently running, if any.
    in_flight: InFlight,
    stats: Arc<RefreshStats>,
}

impl RefreshScheduler {
    /// Create a new scheduler.
    pub fn new(
        source: Arc<dyn RatioSource>,
        cache: SharedRatioCache,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            source,
            cache,
            clock,
            policy,
            in_flight: InFlight::default(),
            stats: Arc::new(RefreshStats::default()),
        }
    }

    pub fn cache(&self) -> &SharedRatioCache {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn stats(&self) -> RefreshStatsSnapshot {
        self.stats.snapshot()
    }

    /// Fetch now and update the cache, joining a refresh already in flight.
    pub async fn refresh(&self) -> RatioResult<RatioSet> {
        self.run_refresh(false).await
    }

    /// Refresh if the cache is stale, falling back to stale data on failure.
    ///
    /// Fails with [`RatioError::ServiceUnavailable`] only when the refresh
    /// failed and nothing has ever been cached.
    #[instrument(skip(self))]
    pub async fn refresh_if_needed(&self) -> RatioResult<RatioSet> {
        if !self.cache.is_stale(self.clock.now()) {
            if let Some(ratios) = self.cache.snapshot() {
                return Ok(ratios);
            }
        }

        match self.run_refresh(true).await {
            Ok(ratios) => Ok(ratios),
            Err(e) => match self.cache.snapshot() {
                Some(stale) => {
                    warn!(
                        error = %e,
                        last_fetch = ?self.cache.last_fetch_time(),
                        "Refresh failed, serving cached ratios"
                    );
                    Ok(stale)
                }
                None => Err(RatioError::ServiceUnavailable(e.to_string())),
            },
        }
    }

    async fn run_refresh(&self, only_if_stale: bool) -> RatioResult<RatioSet> {
        let mut rx = match self.join_or_start(only_if_stale) {
            Flight::Cached(ratios) => return Ok(ratios),
            Flight::Pending(rx) => rx,
        };

        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(done) => done.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(RatioError::Fetch(
                "refresh task ended without an outcome".to_string(),
            ))
        })
    }

    /// Ratios to answer a request with, honouring the configured policy.
    pub async fn current_ratios(&self) -> RatioResult<RatioSet> {
        if self.policy.refreshes_on_access() {
            return self.refresh_if_needed().await;
        }

        self.cache
            .snapshot()
            .ok_or_else(|| RatioError::ServiceUnavailable("no ratios cached".to_string()))
    }

    /// Start the background refresh task.
    ///
    /// The first fetch happens immediately, then once per refresh interval
    /// regardless of traffic. Failures are logged and the cache is kept.
    pub fn spawn_timer(&self) -> RefreshHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = self
            .cache
            .refresh_interval()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        let this = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "Ratio refresh timer started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = this.refresh() => {}
                }
            }

            info!("Ratio refresh timer stopped");
        });

        RefreshHandle { stop_tx, task }
    }

    /// Join the running fetch or start one.
    ///
    /// With `only_if_stale`, staleness is checked again under the in-flight
    /// lock: a fetch that finished since the caller's check has already
    /// updated the cache.
    fn join_or_start(&self, only_if_stale: bool) -> Flight {
        let mut slot = self.in_flight.lock();
        if let Some(rx) = slot.current.as_ref() {
            if rx.has_changed().is_ok() {
                debug!("Joining in-flight refresh");
                return Flight::Pending(rx.clone());
            }
            warn!("Previous refresh task died, starting a new one");
            slot.current = None;
        }

        if only_if_stale && !self.cache.is_stale(self.clock.now()) {
            if let Some(ratios) = self.cache.snapshot() {
                return Flight::Cached(ratios);
            }
        }

        let (tx, rx) = watch::channel(None);
        slot.generation += 1;
        slot.current = Some(rx.clone());
        let guard = InFlightGuard {
            slot: self.in_flight.clone(),
            generation: slot.generation,
        };
        drop(slot);

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.fetch_and_update().await;
            drop(guard);
            let _ = tx.send(Some(outcome));
        });

        Flight::Pending(rx)
    }

    async fn fetch_and_update(&self) -> Outcome {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        match self.source.fetch_ratios().await {
            Ok(ratios) => {
                self.cache.update(ratios, self.clock.now());
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                info!(source = self.source.name(), ratios = %ratios, "Ratios refreshed");
                Ok(ratios)
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(source = self.source.name(), error = %e, "Ratio refresh failed");
                Err(e)
            }
        }
    }
}

/// Handle to the background refresh task.
///
/// Dropping the handle also stops the task.
pub struct RefreshHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Ratio refresh timer exited abnormally");
        }
    }
}
