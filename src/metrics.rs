//! Proxy Metrics
//!
//! Atomic counters with a hand-rolled Prometheus text exposition for
//! `GET /metrics`. Gauges (queue depth, per-replica scalars) are read
//! live at render time.

use crate::domain::entities::Replica;
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked by the ingress and the probe manager.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    /// Requests that entered the proxy path.
    pub requests_total: AtomicU64,
    /// Requests rejected because no replica was available.
    pub no_backend_total: AtomicU64,
    /// Upstream failures (connect errors, timeouts, 5xx).
    pub upstream_errors_total: AtomicU64,
    /// Successful probe RPCs.
    pub probe_success_total: AtomicU64,
    /// Failed probe RPCs.
    pub probe_failure_total: AtomicU64,
    /// Picks per replica URL.
    picks: DashMap<String, AtomicU64>,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pick(&self, url: &str) {
        self.picks
            .entry(url.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn pick_count(&self, url: &str) -> u64 {
        self.picks
            .get(url)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render the Prometheus text exposition. `queue_size` and the
    /// replica snapshot are sampled by the caller at request time.
    pub fn render(&self, queue_size: usize, backends: &[Replica]) -> String {
        let mut out = String::new();

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        };

        counter(
            &mut out,
            "proxy_requests_total",
            "Requests that entered the proxy path",
            self.requests_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "proxy_no_backend_total",
            "Requests rejected with no replica available",
            self.no_backend_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "proxy_upstream_errors_total",
            "Upstream failures on proxied requests",
            self.upstream_errors_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "probe_success_total",
            "Successful probe RPCs",
            self.probe_success_total.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "probe_failure_total",
            "Failed probe RPCs",
            self.probe_failure_total.load(Ordering::Relaxed),
        );

        let _ = writeln!(out, "# HELP probe_queue_size Unique URLs pending a probe");
        let _ = writeln!(out, "# TYPE probe_queue_size gauge");
        let _ = writeln!(out, "probe_queue_size {}", queue_size);

        let _ = writeln!(out, "# HELP backend_picks_total Picks per replica");
        let _ = writeln!(out, "# TYPE backend_picks_total counter");
        for entry in self.picks.iter() {
            let _ = writeln!(
                out,
                "backend_picks_total{{backend=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            );
        }

        let _ = writeln!(out, "# HELP backend_up Replica health from the registry");
        let _ = writeln!(out, "# TYPE backend_up gauge");
        for b in backends {
            let _ = writeln!(
                out,
                "backend_up{{backend=\"{}\"}} {}",
                b.url,
                if b.health { 1 } else { 0 }
            );
        }

        let _ = writeln!(
            out,
            "# HELP backend_requests_in_flight Last observed RIF per replica"
        );
        let _ = writeln!(out, "# TYPE backend_requests_in_flight gauge");
        for b in backends {
            let _ = writeln!(
                out,
                "backend_requests_in_flight{{backend=\"{}\"}} {}",
                b.url, b.requests_in_flight
            );
        }

        out
    }
}
