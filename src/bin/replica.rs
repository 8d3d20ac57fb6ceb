//! Demo replica backend
//!
//! A small axum service that plays the replica side of the protocol:
//! it counts requests in flight, keeps a windowed latency average,
//! answers `GET /probe`, and heartbeats its registration to the proxy.
//! Handler latency is simulated so a local cluster shows a tail.

use axum::extract::State;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{extract::Request, Json, Router};
use parking_lot::Mutex;
use prequal_proxy::domain::entities::ProbeResponse;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retention of windowed latency samples.
const LATENCY_WINDOW: Duration = Duration::from_secs(300);

struct ReplicaState {
    in_flight: AtomicU64,
    /// Total latency across all requests, in microseconds.
    latency_sum_us: AtomicU64,
    request_count: AtomicU64,
    /// Recent (instant, latency_ms) samples for the windowed average.
    window: Mutex<VecDeque<(Instant, f64)>>,
}

impl ReplicaState {
    fn new() -> Self {
        Self {
            in_flight: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            window: Mutex::new(VecDeque::new()),
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_sum_us.load(Ordering::Relaxed) as f64 / 1000.0 / count as f64
    }

    fn windowed_latency_ms(&self) -> f64 {
        let now = Instant::now();
        let mut window = self.window.lock();
        while let Some((at, _)) = window.front() {
            if now.duration_since(*at) >= LATENCY_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.is_empty() {
            return 0.0;
        }
        window.iter().map(|(_, lat)| *lat).sum::<f64>() / window.len() as f64
    }

    fn record(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.latency_sum_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.window.lock().push_back((Instant::now(), ms));
    }
}

/// Tracks requests in flight and latency for every request except the
/// probe endpoint itself.
async fn track_load(
    State(state): State<Arc<ReplicaState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/probe" {
        return next.run(req).await;
    }

    state.in_flight.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let response = next.run(req).await;
    state.in_flight.fetch_sub(1, Ordering::Relaxed);
    state.record(start.elapsed());
    response
}

async fn root() -> impl IntoResponse {
    // simulated work between 50ms and 300ms
    let delay = 50.0 + rand::random::<f64>() * 250.0;
    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    "hello from replica"
}

async fn probe(State(state): State<Arc<ReplicaState>>) -> impl IntoResponse {
    Json(ProbeResponse {
        requests_in_flight: state.in_flight.load(Ordering::Relaxed),
        avg_latency: state.avg_latency_ms(),
        rif_keyed_latency_ms: Some(state.windowed_latency_ms()),
    })
}

/// Periodically registers this replica with the proxy.
async fn heartbeat_loop(proxy_url: String, own_url: String, interval: Duration) {
    let client = reqwest::Client::new();
    loop {
        let result = client
            .post(format!("{}/register", proxy_url))
            .json(&serde_json::json!({ "url": own_url }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("heartbeat registered with {}", proxy_url);
            }
            Ok(resp) => {
                tracing::warn!("heartbeat rejected by proxy: {}", resp.status());
            }
            Err(e) => {
                tracing::warn!("heartbeat failed: {}", e);
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let port: u16 = std::env::var("BACKEND_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8001);
    let host = std::env::var("BACKEND_HOST").unwrap_or_else(|_| "localhost".to_string());
    let own_url = std::env::var("BACKEND_URL")
        .unwrap_or_else(|_| format!("http://{}:{}", host, port));
    let proxy_url =
        std::env::var("PROXY_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let heartbeat_secs: u64 = std::env::var("BACKEND_HEARTBEAT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let state = Arc::new(ReplicaState::new());
    let app = Router::new()
        .route("/", get(root))
        .route("/probe", get(probe))
        .layer(middleware::from_fn_with_state(state.clone(), track_load))
        .with_state(state);

    tokio::spawn(heartbeat_loop(
        proxy_url,
        own_url.clone(),
        Duration::from_secs(heartbeat_secs),
    ));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("replica {} listening on {}", own_url, addr);
    axum::serve(listener, app).await?;
    Ok(())
}
