//! Round-Robin Selector
//!
//! Rotates over the healthy replicas in sorted-URL order so the cycle
//! is stable across registry mutations.

use crate::domain::ports::Selector;
use crate::registry::Registry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct RoundRobinSelector {
    registry: Arc<Registry>,
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Selector for RoundRobinSelector {
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
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[idx].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_returns_none() {
        let registry = Arc::new(Registry::new(Duration::from_secs(60), 100));
        let sel = RoundRobinSelector::new(registry);
        assert_eq!(sel.pick_backend().await, None);
    }

    #[tokio::test]
    async fn test_rotates_in_sorted_order() {
        let registry = Arc::new(Registry::new(Duration::from_secs(60), 100));
        registry.register("http://b:1", None);
        registry.register("http://a:1", None);
        registry.register("http://c:1", None);

        let sel = RoundRobinSelector::new(registry);
        let picks: Vec<String> = {
            let mut out = Vec::new();
            for _ in 0..6 {
                out.push(sel.pick_backend().await.unwrap());
            }
            out
        };
        assert_eq!(
            picks,
            vec![
                "http://a:1",
                "http://b:1",
                "http://c:1",
                "http://a:1",
                "http://b:1",
                "http://c:1"
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_unhealthy() {
        let registry = Arc::new(Registry::new(Duration::from_secs(60), 100));
        registry.register("http://a:1", None);
        registry.register("http://b:1", None);
        registry.mark_unhealthy("http://a:1");

        let sel = RoundRobinSelector::new(registry);
        for _ in 0..4 {
            assert_eq!(sel.pick_backend().await.as_deref(), Some("http://b:1"));
        }
    }
}
