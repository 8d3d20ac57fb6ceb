//! Probe Transport Port
//!
//! Abstracts the RPC that fetches a replica's probe snapshot so the
//! probe manager can be exercised against mock transports in tests.

use crate::domain::entities::ProbeResponse;
use async_trait::async_trait;

/// Fetches `{replica_url}{probe_path}` and decodes the response.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Probe one replica. Any error (connect, status, decode) is a
    /// probe failure; the caller logs and drops it.
    async fn probe(&self, url: &str) -> anyhow::Result<ProbeResponse>;
}
