//! HTTP Ingress
//!
//! Single axum listener carrying the registration API, the metrics
//! exposition, and the catch-all proxy route that forwards every other
//! request to the replica chosen by the configured selector.

use crate::domain::ports::Selector;
use crate::metrics::ProxyMetrics;
use crate::probing::{ProbePool, ProbeTaskQueue};
use crate::registry::Registry;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Upstream failures in a row before a replica is forced unhealthy.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Largest request body the proxy will buffer for forwarding.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Registration request from a replica.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub url: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health: Option<bool>,
}

/// Body carrying only a replica URL (unregister, heartbeat).
#[derive(Debug, Clone, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    message: String,
    backends: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BackendsListResponse {
    backends: Vec<serde_json::Value>,
    total: usize,
}

/// Shared ingress state.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub pool: Arc<ProbePool>,
    pub queue: Arc<ProbeTaskQueue>,
    pub selector: Arc<dyn Selector>,
    pub metrics: Arc<ProxyMetrics>,
    client: reqwest::Client,
    /// Consecutive upstream failures per replica URL.
    failures: DashMap<String, u32>,
    failure_threshold: u32,
}

impl AppState {
    pub fn new(
        registry: Arc<Registry>,
        pool: Arc<ProbePool>,
        queue: Arc<ProbeTaskQueue>,
        selector: Arc<dyn Selector>,
        metrics: Arc<ProxyMetrics>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            pool,
            queue,
            selector,
            metrics,
            client,
            failures: DashMap::new(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    fn record_upstream_failure(&self, url: &str) {
        let mut count = self.failures.entry(url.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.failure_threshold {
            tracing::warn!(
                "backend {} marked unhealthy after {} consecutive failures",
                url,
                *count
            );
            self.registry.mark_unhealthy(url);
        }
    }

    fn clear_upstream_failures(&self, url: &str) {
        self.failures.remove(url);
    }
}

/// Build the ingress router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/heartbeat", post(heartbeat))
        .route("/backends", get(list_backends))
        .route("/metrics", get(metrics))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    state.registry.register(&req.url, req.port);
    let backends = state
        .registry
        .list_backends()
        .into_iter()
        .map(|b| b.url)
        .collect();
    Json(RegisterResponse {
        message: format!("backend {} registered", req.url),
        backends,
    })
}

async fn unregister(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UrlRequest>,
) -> impl IntoResponse {
    state.registry.unregister(&req.url);
    state.pool.remove(&req.url);
    state.clear_upstream_failures(&req.url);
    let backends = state
        .registry
        .list_backends()
        .into_iter()
        .map(|b| b.url)
        .collect();
    Json(RegisterResponse {
        message: format!("backend {} unregistered", req.url),
        backends,
    })
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UrlRequest>,
) -> impl IntoResponse {
    state.registry.register(&req.url, None);
    StatusCode::OK
}

async fn list_backends(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backends: Vec<serde_json::Value> = state
        .registry
        .list_backends()
        .iter()
        .map(|b| serde_json::to_value(b).unwrap_or_default())
        .collect();
    let total = backends.len();
    Json(BackendsListResponse { backends, total })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backends = state.registry.list_backends();
    let body = state.metrics.render(state.queue.size(), &backends);
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Catch-all proxy: pick a replica and forward the request.
async fn proxy(State(state): State<Arc<AppState>>, req: Request) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let backend = match state.selector.pick_backend().await {
        Some(url) => url,
        None => {
            state.metrics.no_backend_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("no backend available, returning 503");
            return (StatusCode::SERVICE_UNAVAILABLE, "no backend servers registered")
                .into_response();
        }
    };
    state.metrics.record_pick(&backend);

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response()
        }
    };

    forward(&state, &backend, parts.method, &parts.uri, parts.headers, bytes).await
}

async fn forward(
    state: &AppState,
    backend: &str,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", backend.trim_end_matches('/'), path_and_query);
    tracing::debug!("proxying {} {} -> {}", method, uri, target);

    let mut outbound = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name) && name != header::HOST {
            outbound.insert(name.clone(), value.clone());
        }
    }

    let result = state
        .client
        .request(method, &target)
        .headers(outbound)
        .body(body)
        .send()
        .await;

    match result {
        Ok(resp) => {
            let status = resp.status();
            if status.is_server_error() {
                state.metrics.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
                state.record_upstream_failure(backend);
            } else {
                state.clear_upstream_failures(backend);
            }

            let mut response_headers = HeaderMap::new();
            for (name, value) in resp.headers().iter() {
                if !is_hop_by_hop(name) && name != header::CONTENT_LENGTH {
                    response_headers.insert(name.clone(), value.clone());
                }
            }

            match resp.bytes().await {
                Ok(body) => (status, response_headers, body).into_response(),
                Err(e) => {
                    state.metrics.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("error reading upstream body from {}: {}", target, e);
                    (StatusCode::BAD_GATEWAY, format!("upstream error: {}", e)).into_response()
                }
            }
        }
        Err(e) => {
            state.metrics.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
            state.record_upstream_failure(backend);
            if e.is_timeout() {
                tracing::error!("upstream timeout for {}: {}", target, e);
                (StatusCode::GATEWAY_TIMEOUT, format!("upstream timeout: {}", e))
                    .into_response()
            } else {
                tracing::error!("upstream error for {}: {}", target, e);
                (StatusCode::BAD_GATEWAY, format!("upstream error: {}", e)).into_response()
            }
        }
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probing::RpsWindow;
    use crate::selectors::build_selector;
    use std::time::Duration;

    fn state() -> Arc<AppState> {
        let registry = Arc::new(Registry::new(Duration::from_secs(60), 100));
        let pool = Arc::new(ProbePool::new(16, 100, Duration::from_secs(300)));
        let rps = Arc::new(RpsWindow::default());
        let selector = build_selector(
            "prequal",
            registry.clone(),
            pool.clone(),
            rps,
            Duration::from_secs(1),
            Some(7),
        );
        Arc::new(AppState::new(
            registry,
            pool,
            Arc::new(ProbeTaskQueue::new(32)),
            selector,
            Arc::new(ProxyMetrics::new()),
            reqwest::Client::new(),
        ))
    }

    #[test]
    fn test_hop_by_hop_filtering() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
        assert!(!is_hop_by_hop(&HeaderName::from_static("x-request-id")));
    }

    #[test]
    fn test_register_request_optional_fields() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{"url": "http://b1:8001"}"#).unwrap();
        assert_eq!(req.url, "http://b1:8001");
        assert_eq!(req.port, None);
        assert_eq!(req.health, None);

        let req: RegisterRequest =
            serde_json::from_str(r#"{"url": "http://b1:8001", "port": 8001, "health": true}"#)
                .unwrap();
        assert_eq!(req.port, Some(8001));
        assert_eq!(req.health, Some(true));
    }

    #[test]
    fn test_failure_tracking_marks_unhealthy_at_threshold() {
        let state = state();
        state.registry.register("http://b1:8001", None);

        state.record_upstream_failure("http://b1:8001");
        state.record_upstream_failure("http://b1:8001");
        assert!(state.registry.list_backends()[0].health);

        state.record_upstream_failure("http://b1:8001");
        assert!(!state.registry.list_backends()[0].health);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let state = state();
        state.registry.register("http://b1:8001", None);

        state.record_upstream_failure("http://b1:8001");
        state.record_upstream_failure("http://b1:8001");
        state.clear_upstream_failures("http://b1:8001");
        state.record_upstream_failure("http://b1:8001");
        assert!(state.registry.list_backends()[0].health);
    }
}
