//! prequal-proxy - Latency-aware HTTP reverse proxy
//!
//! This is the composition root that wires together the registry, the
//! probing subsystem, the configured selector, and the ingress server.

mod adapters;
mod config;
mod domain;
mod infrastructure;
mod metrics;
mod probing;
mod registry;
mod selectors;

use crate::adapters::inbound::http_server;
use crate::adapters::outbound::HttpProbeTransport;
use crate::config::load_config;
use crate::infrastructure::{shutdown_signal, ShutdownController};
use crate::metrics::ProxyMetrics;
use crate::probing::{ProbeManager, ProbePool, ProbeScheduler, ProbeTaskQueue, RpsWindow};
use crate::registry::Registry;
use crate::selectors::build_selector;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    tracing::info!(
        "starting prequal-proxy listen={} balancer={}",
        cfg.listen_addr,
        cfg.load_balancer_class
    );

    // ===== COMPOSITION ROOT =====

    // 1. Core state
    let registry = Arc::new(Registry::new(cfg.heartbeat_timeout(), cfg.max_probe_pool));
    let pool = Arc::new(ProbePool::new(
        cfg.max_backends,
        cfg.max_probe_pool,
        cfg.latency_window(),
    ));
    let queue = Arc::new(ProbeTaskQueue::new(cfg.probe_queue_capacity));
    let rps = Arc::new(RpsWindow::default());
    let metrics = Arc::new(ProxyMetrics::new());

    // 2. Probing: manager workers draining the queue, scheduler
    //    producing forced + probabilistic probe tasks
    let transport = Arc::new(HttpProbeTransport::new(
        cfg.probe_timeout(),
        cfg.probe_path.clone(),
    )?);
    let manager = Arc::new(ProbeManager::new(
        registry.clone(),
        pool.clone(),
        queue.clone(),
        transport,
        metrics.clone(),
        cfg.probe_workers,
        cfg.probe_timeout(),
    ));
    manager.start();

    let scheduler_rng = match cfg.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let scheduler = Arc::new(ProbeScheduler::new(
        registry.clone(),
        queue.clone(),
        rps.clone(),
        cfg.probe_tick(),
        cfg.forced_probe_interval(),
        cfg.probe_rate,
        scheduler_rng,
    ));
    scheduler.start();

    // 3. Selector behind the one capability the ingress sees
    let selector = build_selector(
        &cfg.load_balancer_class,
        registry.clone(),
        pool.clone(),
        rps,
        cfg.starvation_threshold(),
        cfg.rng_seed,
    );
    tracing::info!("using {} selector", selector.name());

    // 4. Ingress
    let client = reqwest::Client::builder()
        .timeout(cfg.upstream_timeout())
        .build()
        .context("failed to build upstream client")?;
    let state = Arc::new(http_server::AppState::new(
        registry,
        pool,
        queue,
        selector,
        metrics,
        client,
    ));
    let app = http_server::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    tracing::info!("listening on {}", cfg.listen_addr);

    let shutdown = ShutdownController::new();
    let signal = {
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal(shutdown).await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .context("server error")?;

    // drain background probing before exit
    scheduler.stop();
    manager.stop(Duration::from_secs(5)).await;
    tracing::info!("shutdown complete");

    Ok(())
}
