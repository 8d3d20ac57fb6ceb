//! Random Selector
//!
//! Uniform choice over the healthy replicas.

use crate::domain::ports::Selector;
use crate::registry::Registry;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;

pub struct RandomSelector {
    registry: Arc<Registry>,
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn new(registry: Arc<Registry>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl Selector for RandomSelector {
    async fn pick_backend(&self) -> Option<String> {
        let healthy: Vec<String> = self
            .registry
            .list_backends()
            .into_iter()
            .filter(|b| b.health)
            .map(|b| b.url)
            .collect();
        if healthy.is_empty() {
            return None;
        }
        let idx = self.rng.lock().gen_range(0..healthy.len());
        Some(healthy[idx].clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
