//! Gateway counters
//!
//! Lock-free counters exposed in the Prometheus text format on `/metrics`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Request outcome counters
#[derive(Debug)]
pub struct GatewayMetrics {
    /// Server start time
    start_time: Instant,
    /// Requests seen by the gateway
    requests: AtomicU64,
    /// Requests whose token and roles resolved to an ACL
    authorized: AtomicU64,
    /// Requests rejected before reaching the upstream
    denied: AtomicU64,
    /// Requests whose parameters were rewritten
    rewritten: AtomicU64,
    /// Requests rejected because a query could not be rewritten
    rewrite_failures: AtomicU64,
    /// API requests forwarded unmodified under a full-access ACL
    full_access: AtomicU64,
    /// Upstream requests that failed
    upstream_errors: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub authorized: u64,
    pub denied: u64,
    pub rewritten: u64,
    pub rewrite_failures: u64,
    pub full_access: u64,
    pub upstream_errors: u64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            authorized: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            rewritten: AtomicU64::new(0),
            rewrite_failures: AtomicU64::new(0),
            full_access: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_authorized(&self) {
        self.authorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewritten(&self) {
        self.rewritten.fetch_add(1, Ordering::Relaxed);
    }

    /// A rewrite failure also counts as a denial
    pub fn record_rewrite_failure(&self) {
        self.rewrite_failures.fetch_add(1, Ordering::Relaxed);
        self.record_denied();
    }

    pub fn record_full_access(&self) {
        self.full_access.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            authorized: self.authorized.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
            rewrite_failures: self.rewrite_failures.load(Ordering::Relaxed),
            full_access: self.full_access.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
        }
    }

    /// Render the counters in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let s = self.snapshot();
        let series: [(&str, &str, &str, u64); 8] = [
            ("lfgw_uptime_seconds", "gauge", "Seconds since the gateway started", s.uptime_secs),
            ("lfgw_requests_total", "counter", "Requests received", s.requests),
            ("lfgw_authorized_total", "counter", "Requests that resolved to an ACL", s.authorized),
            ("lfgw_denied_total", "counter", "Requests rejected by the gateway", s.denied),
            ("lfgw_rewritten_total", "counter", "Requests with rewritten queries", s.rewritten),
            (
                "lfgw_rewrite_failures_total",
                "counter",
                "Requests with queries that could not be rewritten",
                s.rewrite_failures,
            ),
            (
                "lfgw_full_access_total",
                "counter",
                "API requests forwarded unmodified under a full-access ACL",
                s.full_access,
            ),
            (
                "lfgw_upstream_errors_total",
                "counter",
                "Failed upstream requests",
                s.upstream_errors,
            ),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            // Writing to a String cannot fail
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} {kind}");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
