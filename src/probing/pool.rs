//! Probe Pool
//!
//! URL-keyed map of bounded rolling probe histories. Each entry keeps a
//! latency ring, a RIF ring, the last-update instant, and a cached
//! rolling latency average. Readers treat entries past the retention
//! window as absent so selection never keys on long-dead observations.

use crate::domain::entities::SampleRing;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct ProbeEntry {
    latencies: SampleRing,
    rifs: SampleRing,
    updated_at: Instant,
    rolling_latency_ms: f64,
}

/// Bounded pool of per-replica probe samples.
pub struct ProbePool {
    probes: DashMap<String, ProbeEntry>,
    /// Max distinct replicas tracked; exceeding this evicts a victim.
    max_backends: usize,
    /// Per-replica ring capacity.
    capacity: usize,
    /// Entries not updated within this window read as absent.
    retention: Duration,
}

impl ProbePool {
    pub fn new(max_backends: usize, capacity: usize, retention: Duration) -> Self {
        Self {
            probes: DashMap::new(),
            max_backends: max_backends.max(1),
            capacity,
            retention,
        }
    }

    /// Record one probe result for a replica, creating its entry on
    /// first use and evicting an arbitrary victim when the pool is at
    /// its backend limit.
    pub fn add_probe(&self, url: &str, latency_ms: f64, rif: f64) {
        if !self.probes.contains_key(url) && self.probes.len() >= self.max_backends {
            let victim = self.probes.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.probes.remove(&victim);
                tracing::debug!("probe pool full, evicted {}", victim);
            }
        }

        let mut entry = self.probes.entry(url.to_string()).or_insert_with(|| ProbeEntry {
            latencies: SampleRing::new(self.capacity),
            rifs: SampleRing::new(self.capacity),
            updated_at: Instant::now(),
            rolling_latency_ms: 0.0,
        });
        entry.latencies.push(latency_ms);
        entry.rifs.push(rif);
        entry.updated_at = Instant::now();
        entry.rolling_latency_ms = entry.latencies.mean().unwrap_or(0.0);
    }

    /// Cached rolling latency average, or `None` when the replica has
    /// no fresh samples.
    pub fn current_latency(&self, url: &str) -> Option<f64> {
        let entry = self.probes.get(url)?;
        if self.is_stale(&entry) {
            return None;
        }
        Some(entry.rolling_latency_ms)
    }

    /// Copy of the replica's RIF ring, oldest first; empty when absent
    /// or stale.
    pub fn rif_values(&self, url: &str) -> Vec<f64> {
        match self.probes.get(url) {
            Some(entry) if !self.is_stale(&entry) => entry.rifs.values(),
            _ => Vec::new(),
        }
    }

    /// Drop a replica's samples (on unregister).
    pub fn remove(&self, url: &str) {
        self.probes.remove(url);
    }

    /// Number of replicas currently tracked.
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    fn is_stale(&self, entry: &ProbeEntry) -> bool {
        Instant::now().duration_since(entry.updated_at) >= self.retention
    }
}
