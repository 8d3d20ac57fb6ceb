//! Least-Latency Selectors
//!
//! Full scan and power-of-two-choices variants over the last observed
//! average latency in the registry.

use crate::domain::entities::Replica;
use crate::domain::ports::Selector;
use crate::registry::Registry;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::index;
use std::sync::Arc;

fn healthy(registry: &Registry) -> Vec<Replica> {
    registry
        .list_backends()
        .into_iter()
        .filter(|b| b.health)
        .collect()
}

/// Scans every healthy replica for the lowest average latency.
pub struct LeastLatencySelector {
    registry: Arc<Registry>,
}

impl LeastLatencySelector {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Selector for LeastLatencySelector {
    async fn pick_backend(&self) -> Option<String> {
        healthy(&self.registry)
            .into_iter()
            .min_by(|a, b| {
                a.avg_latency_ms
                    .partial_cmp(&b.avg_latency_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|b| b.url)
    }

    fn name(&self) -> &'static str {
        "least_latency"
    }
}

/// Samples two distinct healthy replicas and keeps the faster one.
pub struct LeastLatencyP2cSelector {
    registry: Arc<Registry>,
    rng: Mutex<StdRng>,
}

impl LeastLatencyP2cSelector {
    pub fn new(registry: Arc<Registry>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl Selector for LeastLatencyP2cSelector {
    async fn pick_backend(&self) -> Option<String> {
        let backends = healthy(&self.registry);
        match backends.len() {
            0 => None,
            1 => Some(backends[0].url.clone()),
            n => {
                let sampled = index::sample(&mut *self.rng.lock(), n, 2);
                let a = &backends[sampled.index(0)];
                let b = &backends[sampled.index(1)];
                let pick = if a.avg_latency_ms <= b.avg_latency_ms { a } else { b };
                Some(pick.url.clone())
            }
        }
    }

    fn name(&self) -> &'static str {
        "least_latency_p2c"
    }
}
