//! Streaming Sidecar Server — presents this crate as an OpenAI-compatible
//! provider endpoint to the host agent runtime.
//!
//! `build_router`/`start`/`stop` keep the axum `Router` + `State` + CORS
//! setup separate from the handler, which streams a response body
//! chunk-by-chunk rather than buffering it.

use crate::config::{Config, Mode};
use crate::error::SlimClawError;
use crate::message::Message;
use crate::metrics::{RequestMetrics, Totals};
use crate::orchestrator::{self, OrchestratorContext, OrchestratorServices};
use crate::routing::{provider, AbTestManager, BudgetTracker, LatencyTracker};
use crate::sidecar::catalog;
use crate::sidecar::forwarder::{self, ForwardRequest, Forwarder};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared state for every inbound connection.
pub struct SidecarState {
    config: Config,
    budget: BudgetTracker,
    ab: AbTestManager,
    latency: LatencyTracker,
    totals: Totals,
    forwarder: Forwarder,
    in_flight: AtomicUsize,
    /// Per-request cancellation tokens, keyed by request id, the same
    /// register/cleanup shape as the teacher's `CancelStore` — populated
    /// for the lifetime of the outbound call so a host integration that
    /// detects the inbound connection dropped can cancel the matching
    /// upstream request via [`SidecarState::cancel_request`].
    cancellations: DashMap<String, CancellationToken>,
}

impl SidecarState {
    fn new(config: Config) -> Result<Self, SlimClawError> {
        let ab = AbTestManager::new(config.ab_experiments.clone(), config.max_pending_ab_assignments)
            .map_err(|e| SlimClawError::Config(e.to_string()))?;
        let latency = LatencyTracker::new(config.latency.ring_size, config.latency.outlier_threshold_ms);
        let forwarder = Forwarder::new(std::time::Duration::from_millis(config.forwarder_timeout_ms));
        Ok(Self {
            config,
            budget: BudgetTracker::new(),
            ab,
            latency,
            totals: Totals::new(),
            forwarder,
            in_flight: AtomicUsize::new(0),
            cancellations: DashMap::new(),
        })
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    /// Cancel an in-flight request's outbound call by request id. Returns
    /// `false` if no such request is currently in flight. A host
    /// integration that detects an inbound disconnect calls this with the
    /// `X-SlimClaw-Request-Id` it was handed, mirroring the teacher's
    /// externally-triggered `tasks/cancel`.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        match self.cancellations.get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

struct Running {
    port: u16,
    shutdown: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

/// The streaming sidecar. `start`/`stop` enforce the documented lifecycle:
/// fail fast on double-start or stop-while-stopped, and `stop` drains
/// in-flight responses before returning.
pub struct Sidecar {
    state: Arc<SidecarState>,
    running: Mutex<Option<Running>>,
}

impl Sidecar {
    pub fn new(config: Config) -> Result<Self, SlimClawError> {
        Ok(Self {
            state: Arc::new(SidecarState::new(config)?),
            running: Mutex::new(None),
        })
    }

    pub fn totals(&self) -> &Totals {
        self.state.totals()
    }

    /// Cancel an in-flight request's outbound call by request id. See
    /// [`SidecarState::cancel_request`].
    pub fn cancel_request(&self, request_id: &str) -> bool {
        self.state.cancel_request(request_id)
    }

    /// Bind and serve. Fails fast if already running. Returns the actual
    /// bound port, important when `config.sidecar.port == 0`.
    pub async fn start(&self) -> Result<u16, SlimClawError> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Err(SlimClawError::Internal("sidecar already running".to_string()));
        }

        let bind = &self.state.config.sidecar.bind;
        let port = self.state.config.sidecar.port;
        let addr = format!("{bind}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| SlimClawError::Internal(format!("binding sidecar listener on {addr}: {e}")))?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| SlimClawError::Internal(e.to_string()))?
            .port();

        let app = build_router(self.state.clone());
        let shutdown = CancellationToken::new();
        let shutdown_wait = shutdown.clone();

        tracing::info!(port = bound_port, "sidecar listening");
        let join = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_wait.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::warn!("sidecar server exited with error: {e}");
            }
        });

        *guard = Some(Running {
            port: bound_port,
            shutdown,
            join,
        });
        Ok(bound_port)
    }

    /// Signals graceful shutdown and waits for in-flight responses to
    /// finish streaming before returning. Fails fast if not running.
    pub async fn stop(&self) -> Result<(), SlimClawError> {
        let mut guard = self.running.lock().await;
        let running = guard
            .take()
            .ok_or_else(|| SlimClawError::Internal("sidecar not running".to_string()))?;

        running.shutdown.cancel();
        while self.state.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let _ = running.join.await;
        Ok(())
    }

    pub async fn bound_port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }
}

fn build_router(state: Arc<SidecarState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat/completions", post(chat_completions))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "not found"})),
    )
        .into_response()
}

async fn health(State(state): State<Arc<SidecarState>>) -> Response {
    let port = state.config.sidecar.port;
    (StatusCode::OK, Json(serde_json::json!({"status": "ok", "port": port}))).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn lowercase_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// `POST /v1/chat/completions` — the inbound HTTP contract.
async fn chat_completions(State(state): State<Arc<SidecarState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.in_flight.fetch_add(1, Ordering::SeqCst);
    let response = handle_chat_completions(state.clone(), headers, body).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

async fn handle_chat_completions(state: Arc<SidecarState>, headers: HeaderMap, body: Bytes) -> Response {
    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(format!("invalid JSON body: {e}")),
    };

    let Some(model) = parsed.get("model").and_then(|v| v.as_str()).map(str::to_string) else {
        return bad_request("missing required field \"model\"");
    };
    if !catalog::is_virtual(&model) {
        return bad_request(format!("\"{model}\" is not a virtual slimclaw model"));
    }

    let messages: Vec<Message> = match parsed.get("messages").cloned() {
        Some(v) => match serde_json::from_value(v) {
            Ok(m) => m,
            Err(e) => return bad_request(format!("invalid \"messages\" field: {e}")),
        },
        None => return bad_request("missing required field \"messages\""),
    };

    let lowered_headers = lowercase_headers(&headers);
    let request_id = uuid::Uuid::new_v4().to_string();
    let run_id = lowered_headers
        .get("x-run-id")
        .cloned()
        .unwrap_or_else(|| request_id.clone());
    let bypass_optimization = lowered_headers
        .get("x-slimclaw-bypass")
        .is_some_and(|v| v == "true" || v == "1");

    let ctx = OrchestratorContext {
        request_id: request_id.clone(),
        original_model: model,
        headers: lowered_headers.clone(),
        run_id,
        scope: lowered_headers.get("x-budget-scope").cloned(),
        bypass_optimization,
    };

    let services = OrchestratorServices {
        budget: &state.budget,
        ab: &state.ab,
        latency: &state.latency,
        collector: None,
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    let result = orchestrator::optimize(&messages, &state.config, &ctx, &services, now_ms);
    state.totals.record_request(&result.metrics);

    let Some(decision) = &result.routing_decision else {
        return bad_request("routing is disabled; no concrete model to forward to");
    };

    let mut outbound = parsed;
    if let serde_json::Value::Object(ref mut map) = outbound {
        map.insert(
            "messages".to_string(),
            serde_json::to_value(&result.messages).unwrap_or(serde_json::Value::Null),
        );
    }

    // Shadow mode computes and logs the recommendation above but must not
    // change the outgoing request: forward to the original model with no
    // routing headers attached. Active mode applies it.
    let (forward_model, forward_provider, forward_headers) = match state.config.mode {
        Mode::Active => (decision.target_model.clone(), decision.provider.clone(), decision.headers.clone()),
        Mode::Shadow => {
            let resolved = provider::resolve(&decision.original_model, &state.config.routing.tier_providers);
            (decision.original_model.clone(), resolved.provider, HashMap::new())
        }
    };

    let forward_req = ForwardRequest {
        body: outbound,
        headers: forward_headers,
        target_provider: forward_provider,
        target_model: forward_model.clone(),
    };

    let cancel = CancellationToken::new();
    state.cancellations.insert(request_id.clone(), cancel.clone());
    let started_at = std::time::Instant::now();
    let upstream = state.forwarder.forward(&state.config, forward_req, cancel).await;
    state.cancellations.remove(&request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    state.latency.record(&forward_model, latency_ms, now_ms);

    match upstream {
        Ok(resp) => stream_response(&state, resp, &result.metrics, latency_ms, state.config.mode),
        Err(e) => upstream_error_response(e),
    }
}

fn upstream_error_response(err: SlimClawError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// Pipes the upstream response through unchanged, one chunk in for one
/// chunk out — never buffering the full body.
fn stream_response(state: &SidecarState, upstream: forwarder::ForwardResponse, metrics: &RequestMetrics, latency_ms: u64, mode: Mode) -> Response {
    let status = StatusCode::from_u16(upstream.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let body = Body::from_stream(forwarder::body_stream(upstream.body));
    let mut response = Response::builder().status(status);

    if let Some(headers_mut) = response.headers_mut() {
        headers_mut.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type).unwrap_or_else(|_| HeaderValue::from_static("application/json")),
        );
        if state.config.sidecar.debug_headers {
            for (name, value) in debug_headers(metrics, latency_ms, mode) {
                if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(&value)) {
                    headers_mut.insert(name, value);
                }
            }
        }
    }

    response.body(body).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Builds the `X-SlimClaw-*` debug headers. When
/// `config.sidecar.debug_headers` is false none of these are attached at
/// all; when the pipeline itself is globally disabled only
/// the first three would apply (`enabled` is false on `metrics`-less
/// passthrough results, handled by the caller before this is reached).
fn debug_headers(metrics: &RequestMetrics, latency_ms: u64, mode: Mode) -> Vec<(String, String)> {
    let mode_str = match mode {
        Mode::Active => "active",
        Mode::Shadow => "shadow",
    };
    let mut out = vec![
        ("x-slimclaw-request-id".to_string(), metrics.request_id.clone()),
        ("x-slimclaw-enabled".to_string(), "true".to_string()),
        ("x-slimclaw-mode".to_string(), mode_str.to_string()),
        ("x-slimclaw-original-tokens".to_string(), metrics.original_tokens.to_string()),
        ("x-slimclaw-optimized-tokens".to_string(), metrics.optimized_tokens.to_string()),
        ("x-slimclaw-tokens-saved".to_string(), metrics.tokens_saved.to_string()),
        (
            "x-slimclaw-savings-percent".to_string(),
            format!("{:.2}", metrics.combined_savings_percent),
        ),
        (
            "x-slimclaw-windowing".to_string(),
            if metrics.windowing_applied { "applied" } else { "skipped" }.to_string(),
        ),
        (
            "x-slimclaw-caching".to_string(),
            if metrics.cache_breakpoints_injected > 0 { "applied" } else { "skipped" }.to_string(),
        ),
    ];

    if let Some(tier) = metrics.tier {
        out.push(("x-slimclaw-classification".to_string(), tier.as_str().to_string()));
    }
    if let Some(reason) = metrics.routing_reason {
        out.push(("x-slimclaw-routing".to_string(), format!("{reason:?}").to_ascii_lowercase()));
    }
    if metrics.windowing_applied {
        out.push(("x-slimclaw-trimmed-messages".to_string(), metrics.trimmed_messages.to_string()));
    }
    if metrics.cache_breakpoints_injected > 0 {
        out.push((
            "x-slimclaw-cache-breakpoints".to_string(),
            metrics.cache_breakpoints_injected.to_string(),
        ));
    }
    out.push(("x-slimclaw-latency-ms".to_string(), latency_ms.to_string()));
    out
}

/// Address the sidecar is configured to bind, for logging at startup.
pub fn configured_addr(config: &Config) -> String {
    format!("{}:{}", config.sidecar.bind, config.sidecar.port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComplexityTier;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.sidecar.port = 0;
        cfg.routing.enabled = true;
        cfg.routing.set_tier_model(ComplexityTier::Simple, "anthropic/haiku");
        cfg.routing.set_tier_model(ComplexityTier::Mid, "anthropic/sonnet");
        cfg.routing.set_tier_model(ComplexityTier::Complex, "anthropic/opus");
        cfg.routing.set_tier_model(ComplexityTier::Reasoning, "anthropic/opus");
        cfg.routing.min_confidence = 0.0;
        cfg
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_on_known_path_is_405() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let req = Request::builder()
            .method("GET")
            .uri("/v1/chat/completions")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unparseable_body_is_400() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_virtual_model_is_rejected() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let payload = serde_json::json!({
            "model": "anthropic/claude-opus-4",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn virtual_model_without_provider_credentials_surfaces_upstream_error() {
        let state = Arc::new(SidecarState::new(test_config()).unwrap());
        let app = build_router(state);
        let payload = serde_json::json!({
            "model": catalog::AUTO_MODEL_ID,
            "messages": [{"role": "user", "content": "Hey there! Thanks, just wanted to say hi"}]
        });
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        // No provider credentials configured in test_config -> forwarder
        // rejects with "unknown provider", surfaced as a 502.
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn start_twice_fails_fast() {
        let sidecar = Sidecar::new(test_config()).unwrap();
        sidecar.start().await.unwrap();
        let second = sidecar.start().await;
        assert!(second.is_err());
        sidecar.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_fails_fast() {
        let sidecar = Sidecar::new(test_config()).unwrap();
        assert!(sidecar.stop().await.is_err());
    }
}
