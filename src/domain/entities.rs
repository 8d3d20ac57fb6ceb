//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the proxy domain:
//! replicas, their probe histories, and the probe wire format.

use crate::domain::stats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Hot/cold classification of a replica relative to its own RIF history.
///
/// `Unknown` means no probe has ever succeeded for the replica; such
/// replicas receive no traffic from the Prequal selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HotCold {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Cold,
    Hot,
}

impl HotCold {
    /// Whether at least one probe has succeeded for the replica.
    pub fn is_probed(&self) -> bool {
        !matches!(self, HotCold::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HotCold::Unknown => "",
            HotCold::Cold => "cold",
            HotCold::Hot => "hot",
        }
    }
}

/// Bounded ring of f64 samples. Appending at capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy of the current samples, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn median(&self) -> Option<f64> {
        stats::median(&self.values())
    }

    pub fn mean(&self) -> Option<f64> {
        stats::mean(&self.values())
    }
}

/// Per-replica probe history: recent RIF values and latencies.
///
/// Owned by the replica itself (the probe pool keeps its own copy keyed
/// by URL); the probe manager reconciles both on every update.
#[derive(Debug, Clone)]
pub struct ReplicaProbe {
    rifs: SampleRing,
    latencies: SampleRing,
}

impl ReplicaProbe {
    pub fn new(capacity: usize) -> Self {
        Self {
            rifs: SampleRing::new(capacity),
            latencies: SampleRing::new(capacity),
        }
    }

    /// Record one probe observation.
    pub fn record(&mut self, latency_ms: f64, rif: f64) {
        self.latencies.push(latency_ms);
        self.rifs.push(rif);
    }

    pub fn median_rif(&self) -> Option<f64> {
        self.rifs.median()
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        self.latencies.mean()
    }

    pub fn rif_values(&self) -> Vec<f64> {
        self.rifs.values()
    }

    /// Classify the replica against its own RIF median: hot when the
    /// current RIF exceeds the median, cold otherwise. `Unknown` only
    /// while the ring is empty.
    pub fn classify(&self, current_rif: f64) -> HotCold {
        match self.median_rif() {
            None => HotCold::Unknown,
            Some(med) if current_rif > med => HotCold::Hot,
            Some(_) => HotCold::Cold,
        }
    }
}

/// A backend replica as tracked by the registry.
///
/// Scalar fields hold the last observed probe values; the `probe` field
/// holds the replica's own bounded sample history. All fields of one
/// replica change together under the registry's per-entry boundary.
#[derive(Debug, Clone, Serialize)]
pub struct Replica {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub health: bool,
    pub hot_cold: HotCold,
    pub requests_in_flight: u64,
    pub avg_latency_ms: f64,
    pub rif_keyed_latency_ms: f64,
    #[serde(skip)]
    pub probe: ReplicaProbe,
}

impl Replica {
    pub fn new(url: impl Into<String>, port: Option<u16>, probe_capacity: usize) -> Self {
        Self {
            url: url.into(),
            port,
            health: true,
            hot_cold: HotCold::Unknown,
            requests_in_flight: 0,
            avg_latency_ms: 0.0,
            rif_keyed_latency_ms: 0.0,
            probe: ReplicaProbe::new(probe_capacity),
        }
    }
}

/// Wire format of a replica's `GET /probe` response.
///
/// Field aliases accept the spellings used by older replicas
/// (`in_flight_requests`, `windowed_latency`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResponse {
    #[serde(alias = "in_flight_requests")]
    pub requests_in_flight: u64,
    #[serde(alias = "avg_latency_ms")]
    pub avg_latency: f64,
    #[serde(default, alias = "windowed_latency")]
    pub rif_keyed_latency_ms: Option<f64>,
}

impl ProbeResponse {
    /// The latency the selector should key on: RIF-keyed when the
    /// replica reports it, overall average otherwise.
    pub fn effective_latency_ms(&self) -> f64 {
        self.rif_keyed_latency_ms.unwrap_or(self.avg_latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== HotCold =====

    #[test]
    fn test_hot_cold_default_is_unknown() {
        assert_eq!(HotCold::default(), HotCold::Unknown);
        assert!(!HotCold::Unknown.is_probed());
        assert!(HotCold::Cold.is_probed());
        assert!(HotCold::Hot.is_probed());
    }

    #[test]
    fn test_hot_cold_serializes_as_strings() {
        assert_eq!(serde_json::to_string(&HotCold::Unknown).unwrap(), "\"\"");
        assert_eq!(serde_json::to_string(&HotCold::Cold).unwrap(), "\"cold\"");
        assert_eq!(serde_json::to_string(&HotCold::Hot).unwrap(), "\"hot\"");
    }

    #[test]
    fn test_hot_cold_as_str() {
        assert_eq!(HotCold::Unknown.as_str(), "");
        assert_eq!(HotCold::Cold.as_str(), "cold");
        assert_eq!(HotCold::Hot.as_str(), "hot");
    }

    // ===== SampleRing =====

    #[test]
    fn test_ring_push_and_last() {
        let mut ring = SampleRing::new(3);
        assert!(ring.is_empty());
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.last(), Some(2.0));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_ring_evicts_oldest_at_capacity() {
        let mut ring = SampleRing::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            ring.push(v);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.values(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ring_never_exceeds_capacity() {
        let mut ring = SampleRing::new(5);
        for v in 0..1000 {
            ring.push(v as f64);
        }
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.last(), Some(999.0));
    }

    #[test]
    fn test_ring_zero_capacity_treated_as_one() {
        let mut ring = SampleRing::new(0);
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.last(), Some(2.0));
    }

    #[test]
    fn test_ring_median_and_mean() {
        let mut ring = SampleRing::new(10);
        for v in [100.0, 100.0, 1.0] {
            ring.push(v);
        }
        assert_eq!(ring.median(), Some(100.0));
        assert_eq!(ring.mean(), Some(67.0));
    }

    // ===== ReplicaProbe =====

    #[test]
    fn test_probe_classify_unknown_when_empty() {
        let probe = ReplicaProbe::new(10);
        assert_eq!(probe.classify(5.0), HotCold::Unknown);
    }

    #[test]
    fn test_probe_classify_hot_above_median() {
        let mut probe = ReplicaProbe::new(10);
        probe.record(10.0, 1.0);
        probe.record(10.0, 5.0);
        // median of [1, 5] = 3
        assert_eq!(probe.classify(5.0), HotCold::Hot);
    }

    #[test]
    fn test_probe_classify_cold_at_or_below_median() {
        let mut probe = ReplicaProbe::new(10);
        probe.record(10.0, 2.0);
        probe.record(10.0, 4.0);
        assert_eq!(probe.classify(3.0), HotCold::Cold);
        assert_eq!(probe.classify(1.0), HotCold::Cold);
    }

    #[test]
    fn test_probe_avg_latency() {
        let mut probe = ReplicaProbe::new(10);
        probe.record(50.0, 1.0);
        probe.record(50.0, 1.0);
        probe.record(0.0, 1.0);
        let avg = probe.avg_latency_ms().unwrap();
        assert!((avg - 100.0 / 3.0).abs() < 1e-9);
    }

    // ===== ProbeResponse =====

    #[test]
    fn test_probe_response_canonical_fields() {
        let json = r#"{"requests_in_flight": 7, "avg_latency": 12.5, "rif_keyed_latency_ms": 9.0}"#;
        let resp: ProbeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.requests_in_flight, 7);
        assert_eq!(resp.avg_latency, 12.5);
        assert_eq!(resp.effective_latency_ms(), 9.0);
    }

    #[test]
    fn test_probe_response_legacy_aliases() {
        let json = r#"{"in_flight_requests": 3, "avg_latency": 20.0, "windowed_latency": 15.0}"#;
        let resp: ProbeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.requests_in_flight, 3);
        assert_eq!(resp.effective_latency_ms(), 15.0);
    }

    #[test]
    fn test_probe_response_falls_back_to_avg_latency() {
        let json = r#"{"requests_in_flight": 1, "avg_latency": 42.0}"#;
        let resp: ProbeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.rif_keyed_latency_ms, None);
        assert_eq!(resp.effective_latency_ms(), 42.0);
    }

    // ===== Replica =====

    #[test]
    fn test_replica_new_defaults() {
        let r = Replica::new("http://b1:8001", Some(8001), 100);
        assert!(r.health);
        assert_eq!(r.hot_cold, HotCold::Unknown);
        assert_eq!(r.requests_in_flight, 0);
        assert!(r.probe.rif_values().is_empty());
    }

    #[test]
    fn test_replica_serialization_skips_probe() {
        let r = Replica::new("http://b1:8001", None, 100);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["url"], "http://b1:8001");
        assert_eq!(json["hot_cold"], "");
        assert!(json.get("probe").is_none());
        assert!(json.get("port").is_none());
    }
}
