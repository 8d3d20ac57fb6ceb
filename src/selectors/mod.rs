//! Load-Balancing Selectors
//!
//! One module per policy, all behind the `Selector` port. The factory
//! dispatches on the `LOAD_BALANCER_CLASS` configuration string.

pub mod least_latency;
pub mod least_rif;
pub mod prequal;
pub mod random;
pub mod round_robin;

pub use least_latency::{LeastLatencySelector, LeastLatencyP2cSelector};
pub use least_rif::{LeastRifSelector, LeastRifP2cSelector};
pub use prequal::PrequalSelector;
pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;

use crate::domain::ports::Selector;
use crate::probing::{ProbePool, RpsWindow};
use crate::registry::Registry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured selector. Unknown class names warn and fall
/// back to prequal.
pub fn build_selector(
    class: &str,
    registry: Arc<Registry>,
    pool: Arc<ProbePool>,
    rps: Arc<RpsWindow>,
    starvation_threshold: Duration,
    seed: Option<u64>,
) -> Arc<dyn Selector> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match class {
        "round_robin" => Arc::new(RoundRobinSelector::new(registry)),
        "random" => Arc::new(RandomSelector::new(registry, rng)),
        "least_latency" => Arc::new(LeastLatencySelector::new(registry)),
        "least_latency_p2c" => Arc::new(LeastLatencyP2cSelector::new(registry, rng)),
        "least_rif" => Arc::new(LeastRifSelector::new(registry)),
        "least_rif_p2c" => Arc::new(LeastRifP2cSelector::new(registry, rng)),
        "prequal" => Arc::new(PrequalSelector::new(
            registry,
            pool,
            rps,
            starvation_threshold,
            rng,
        )),
        other => {
            tracing::warn!("unknown load balancer class {:?}, using prequal", other);
            Arc::new(PrequalSelector::new(
                registry,
                pool,
                rps,
                starvation_threshold,
                rng,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps() -> (Arc<Registry>, Arc<ProbePool>, Arc<RpsWindow>) {
        (
            Arc::new(Registry::new(Duration::from_secs(60), 100)),
            Arc::new(ProbePool::new(16, 100, Duration::from_secs(300))),
            Arc::new(RpsWindow::default()),
        )
    }

    #[test]
    fn test_factory_builds_each_class() {
        let cases = [
            ("prequal", "prequal"),
            ("round_robin", "round_robin"),
            ("random", "random"),
            ("least_latency", "least_latency"),
            ("least_latency_p2c", "least_latency_p2c"),
            ("least_rif", "least_rif"),
            ("least_rif_p2c", "least_rif_p2c"),
        ];
        for (class, expected) in cases {
            let (registry, pool, rps) = deps();
            let sel = build_selector(class, registry, pool, rps, Duration::from_secs(1), Some(1));
            assert_eq!(sel.name(), expected);
        }
    }

    #[test]
    fn test_factory_unknown_falls_back_to_prequal() {
        let (registry, pool, rps) = deps();
        let sel = build_selector("bogus", registry, pool, rps, Duration::from_secs(1), Some(1));
        assert_eq!(sel.name(), "prequal");
    }
}
