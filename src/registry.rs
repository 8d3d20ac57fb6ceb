//! Backend Registry
//!
//! Membership, liveness, and mutable per-replica state. Backends
//! register (and re-register via heartbeats) keyed by URL; listing
//! recomputes health from heartbeat age. Each DashMap entry carries its
//! own lock, which is the per-replica mutation boundary: a probe result
//! applied through `update_backend` becomes visible to readers all at
//! once.

use crate::domain::entities::Replica;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct ReplicaSlot {
    replica: Replica,
    last_heartbeat: Instant,
    // set by the ingress failure tracker, cleared by the next heartbeat
    forced_unhealthy: bool,
}

/// URL-keyed registry of backend replicas.
pub struct Registry {
    backends: DashMap<String, ReplicaSlot>,
    heartbeat_timeout: Duration,
    probe_capacity: usize,
}

impl Registry {
    pub fn new(heartbeat_timeout: Duration, probe_capacity: usize) -> Self {
        Self {
            backends: DashMap::new(),
            heartbeat_timeout,
            probe_capacity,
        }
    }

    /// Register or refresh a replica. Idempotent: an existing entry
    /// keeps its probe state and only has its heartbeat and health
    /// refreshed.
    pub fn register(&self, url: &str, port: Option<u16>) {
        let now = Instant::now();
        match self.backends.get_mut(url) {
            Some(mut slot) => {
                slot.last_heartbeat = now;
                slot.forced_unhealthy = false;
                slot.replica.health = true;
                if port.is_some() {
                    slot.replica.port = port;
                }
            }
            None => {
                self.backends.insert(
                    url.to_string(),
                    ReplicaSlot {
                        replica: Replica::new(url, port, self.probe_capacity),
                        last_heartbeat: now,
                        forced_unhealthy: false,
                    },
                );
                tracing::info!("registered backend {}", url);
            }
        }
    }

    /// Remove a replica. Returns whether it existed.
    pub fn unregister(&self, url: &str) -> bool {
        let removed = self.backends.remove(url).is_some();
        if removed {
            tracing::info!("unregistered backend {}", url);
        }
        removed
    }

    /// Snapshot of all replicas, sorted by URL, with health recomputed
    /// from heartbeat age. The recomputed flag is written back to the
    /// live entry so probing and selection agree on liveness.
    pub fn list_backends(&self) -> Vec<Replica> {
        let now = Instant::now();
        let mut out = Vec::with_capacity(self.backends.len());
        for mut slot in self.backends.iter_mut() {
            let fresh = now.duration_since(slot.last_heartbeat) < self.heartbeat_timeout;
            slot.replica.health = fresh && !slot.forced_unhealthy;
            out.push(slot.replica.clone());
        }
        out.sort_by(|a, b| a.url.cmp(&b.url));
        out
    }

    /// Apply a mutator under the per-entry write boundary. Silently a
    /// no-op when the URL is no longer registered.
    pub fn update_backend<F>(&self, url: &str, mutator: F)
    where
        F: FnOnce(&mut Replica),
    {
        if let Some(mut slot) = self.backends.get_mut(url) {
            mutator(&mut slot.replica);
        }
    }

    /// Force a replica unhealthy until its next heartbeat. Used by the
    /// ingress when a backend keeps failing proxied requests.
    pub fn mark_unhealthy(&self, url: &str) {
        if let Some(mut slot) = self.backends.get_mut(url) {
            slot.replica.health = false;
            slot.forced_unhealthy = true;
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.backends.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
