//! Probe Manager
//!
//! Drains the probe task queue and executes probe RPCs with bounded
//! concurrency. Successful probes are written to both the probe pool
//! and the registry under the per-replica boundary; failures are
//! logged and dropped - the scheduler will reattempt on a later pass.

use crate::domain::entities::ProbeResponse;
use crate::domain::ports::ProbeTransport;
use crate::infrastructure::ShutdownController;
use crate::metrics::ProxyMetrics;
use crate::probing::{ProbePool, ProbeTaskQueue};
use crate::registry::Registry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Background probe executor.
pub struct ProbeManager {
    registry: Arc<Registry>,
    pool: Arc<ProbePool>,
    queue: Arc<ProbeTaskQueue>,
    transport: Arc<dyn ProbeTransport>,
    metrics: Arc<ProxyMetrics>,
    workers: Arc<Semaphore>,
    probe_timeout: Duration,
    shutdown: ShutdownController,
}

impl ProbeManager {
    pub fn new(
        registry: Arc<Registry>,
        pool: Arc<ProbePool>,
        queue: Arc<ProbeTaskQueue>,
        transport: Arc<dyn ProbeTransport>,
        metrics: Arc<ProxyMetrics>,
        max_concurrent: usize,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            queue,
            transport,
            metrics,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
            probe_timeout,
            shutdown: ShutdownController::new(),
        }
    }

    /// Launch the dispatcher task. It pulls URLs off the queue and
    /// spawns one worker per task, gated by the concurrency semaphore.
    pub fn start(self: &Arc<Self>) {
        let manager = self.clone();
        let mut stop = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                let url = tokio::select! {
                    _ = stop.recv() => break,
                    task = manager.queue.get_task() => match task {
                        Some(url) => url,
                        None => break,
                    },
                };

                let permit = tokio::select! {
                    _ = stop.recv() => break,
                    permit = manager.workers.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };

                let worker = manager.clone();
                let guard = manager.shutdown.guard();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    worker.run_probe(&url).await;
                });
            }
            tracing::debug!("probe dispatcher stopped");
        });
    }

    /// Stop accepting new work and drain in-flight workers, bounded by
    /// `drain_timeout`.
    pub async fn stop(&self, drain_timeout: Duration) -> bool {
        self.shutdown.signal();
        self.shutdown.wait_for_drain(drain_timeout).await
    }

    /// Execute one probe RPC and apply the result.
    async fn run_probe(&self, url: &str) {
        let result = tokio::time::timeout(self.probe_timeout, self.transport.probe(url)).await;
        match result {
            Ok(Ok(resp)) => {
                tracing::debug!(
                    "probe success for {}: rif={} latency={:.3}ms",
                    url,
                    resp.requests_in_flight,
                    resp.effective_latency_ms()
                );
                self.metrics.probe_success_total.fetch_add(1, Ordering::Relaxed);
                apply_probe_result(&self.registry, &self.pool, url, &resp);
            }
            Ok(Err(e)) => {
                self.metrics.probe_failure_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("probe failed for {}: {:#}", url, e);
            }
            Err(_) => {
                self.metrics.probe_failure_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "probe timed out for {} after {:?}",
                    url,
                    self.probe_timeout
                );
            }
        }
    }
}

/// Write a successful probe into the pool and the registry. All replica
/// fields - scalars, rings, hot/cold state - change together under the
/// registry's per-entry boundary.
pub fn apply_probe_result(
    registry: &Registry,
    pool: &ProbePool,
    url: &str,
    resp: &ProbeResponse,
) {
    let rif = resp.requests_in_flight as f64;
    let latency = resp.effective_latency_ms();

    pool.add_probe(url, latency, rif);
    registry.update_backend(url, |replica| {
        replica.requests_in_flight = resp.requests_in_flight;
        replica.avg_latency_ms = resp.avg_latency;
        replica.rif_keyed_latency_ms = latency;
        replica.probe.record(latency, rif);
        replica.hot_cold = replica.probe.classify(rif);
    });
}
