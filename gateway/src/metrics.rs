//! Request counters for gateway monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use hyper::StatusCode;

/// Gateway metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests routed.
    pub requests_total: AtomicU64,
    /// Conversions answered successfully.
    pub conversions_total: AtomicU64,
    /// Responses with a 4xx status.
    pub client_errors: AtomicU64,
    /// Responses with a 5xx status.
    pub server_errors: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a routed request by its response status.
    pub fn record_response(&self, status: StatusCode) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a successful conversion.
    pub fn conversion_completed(&self) {
        self.conversions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            conversions_total: self.conversions_total.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub conversions_total: u64,
    pub client_errors: u64,
    pub server_errors: u64,
}
