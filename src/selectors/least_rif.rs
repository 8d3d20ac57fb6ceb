//! Least-RIF Selectors
//!
//! Full scan and power-of-two-choices variants over the last observed
//! requests-in-flight in the registry.

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

/// Scans every healthy replica for the lowest RIF.
pub struct LeastRifSelector {
    registry: Arc<Registry>,
}

impl LeastRifSelector {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Selector for LeastRifSelector {
    async fn pick_backend(&self) -> Option<String> {
        healthy(&self.registry)
            .into_iter()
            .min_by_key(|b| b.requests_in_flight)
            .map(|b| b.url)
    }

    fn name(&self) -> &'static str {
        "least_rif"
    }
}

/// Samples two distinct healthy replicas and keeps the less loaded one.
pub struct LeastRifP2cSelector {
    registry: Arc<Registry>,
    rng: Mutex<StdRng>,
}

impl LeastRifP2cSelector {
    pub fn new(registry: Arc<Registry>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl Selector for LeastRifP2cSelector {
    async fn pick_backend(&self) -> Option<String> {
        let backends = healthy(&self.registry);
        match backends.len() {
            0 => None,
            1 => Some(backends[0].url.clone()),
            n => {
                let sampled = index::sample(&mut *self.rng.lock(), n, 2);
                let a = &backends[sampled.index(0)];
                let b = &backends[sampled.index(1)];
                let pick = if a.requests_in_flight <= b.requests_in_flight {
                    a
                } else {
                    b
                };
                Some(pick.url.clone())
            }
        }
    }

    fn name(&self) -> &'static str {
        "least_rif_p2c"
    }
}
