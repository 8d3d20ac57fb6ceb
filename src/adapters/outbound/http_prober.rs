//! HTTP Probe Transport
//!
//! reqwest-backed implementation of the `ProbeTransport` port: fetches
//! `{replica_url}{probe_path}` and decodes the JSON probe snapshot.

use crate::domain::entities::ProbeResponse;
use crate::domain::ports::ProbeTransport;
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpProbeTransport {
    client: reqwest::Client,
    probe_path: String,
}

impl HttpProbeTransport {
    /// Build a transport with a fixed per-probe timeout and probe path
    /// (default `/probe`).
    pub fn new(timeout: Duration, probe_path: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build probe client")?;
        Ok(Self {
            client,
            probe_path: probe_path.into(),
        })
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn probe(&self, url: &str) -> anyhow::Result<ProbeResponse> {
        let target = format!("{}{}", url.trim_end_matches('/'), self.probe_path);
        let resp = self
            .client
            .get(&target)
            .send()
            .await
            .with_context(|| format!("probe request to {} failed", target))?;

        if !resp.status().is_success() {
            anyhow::bail!("probe to {} returned status {}", target, resp.status());
        }

        resp.json::<ProbeResponse>()
            .await
            .with_context(|| format!("invalid probe response from {}", target))
    }
}
