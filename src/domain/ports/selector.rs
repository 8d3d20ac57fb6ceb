//! Selector Port
//!
//! Every load-balancing policy - Prequal and the baselines alike -
//! implements this one capability. The ingress only ever sees
//! `pick_backend`.

use async_trait::async_trait;

/// Picks the replica URL the next request should be forwarded to.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Returns the chosen replica URL, or `None` when no replica is
    /// available. Never blocks on I/O; must complete in O(#replicas).
    async fn pick_backend(&self) -> Option<String>;

    /// Policy name, as used in `LOAD_BALANCER_CLASS`.
    fn name(&self) -> &'static str;
}
