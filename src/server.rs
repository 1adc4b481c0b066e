//! Proxy HTTP Server
//!
//! Exposes an OpenAI-compatible surface in front of the NVIDIA NIM API:
//! ```text
//! Client ──► POST /v1/chat/completions ──► NIM /chat/completions
//!        ◄── JSON body or text/event-stream ◄──┘
//! ```
//!
//! Auxiliary endpoints (`/v1/models`, `/health`, `/`) are static and never
//! contact the upstream.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::types::{ChatCompletionRequest, HealthResponse, ModelList};
use crate::upstream::NimClient;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, options, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// ============================================================================
// SERVER STATE
// ============================================================================

pub struct ProxyState {
    pub config: ProxyConfig,
    pub upstream: NimClient,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream = NimClient::new(&config)?;
        Ok(Self { config, upstream })
    }
}

// ============================================================================
// /v1/chat/completions ENDPOINT
// ============================================================================

/// POST /v1/chat/completions - Proxy a chat completion to NIM
pub async fn chat_completions(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let response = match proxy_chat(&state, &body).await {
        Ok(response) => response,
        Err(e) => {
            error!("Chat completion failed: {}", e);
            e.into_response()
        }
    };
    info!("Chat completion status: {}", response.status());
    response
}

async fn proxy_chat(state: &ProxyState, body: &[u8]) -> Result<Response> {
    let inbound = parse_body(body)?;
    let request = ChatCompletionRequest::from_inbound(&inbound, &state.config.defaults);
    info!("Received chat request with model: {}", request.model_name());

    if !state.config.has_api_key() {
        return Err(ProxyError::NotConfigured);
    }

    if request.is_stream() {
        let lines = state.upstream.chat_completion_stream(&request).await?;
        Ok((
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(lines),
        )
            .into_response())
    } else {
        let completion = state.upstream.chat_completion(&request).await?;
        Ok((StatusCode::OK, Json(completion)).into_response())
    }
}

fn parse_body(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProxyError::Internal(format!(
            "Request body must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ProxyError::Internal(format!("Invalid JSON body: {}", e))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// OPTIONS /v1/chat/completions - Explicit preflight acknowledgement
pub async fn chat_completions_preflight() -> impl IntoResponse {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "*"),
        ],
        Json(json!({ "status": "ok" })),
    )
}

// ============================================================================
// AUXILIARY ENDPOINTS
// ============================================================================

/// GET /v1/models
pub async fn list_models() -> Json<ModelList> {
    info!("Models list requested");
    Json(ModelList::default())
}

/// GET /health
pub async fn health_check(State(state): State<Arc<ProxyState>>) -> Json<HealthResponse> {
    let api_key_configured = state.config.api_key_configured();
    info!("Health check - API configured: {}", api_key_configured);
    Json(HealthResponse {
        status: "healthy",
        api_key_configured,
        base_url: state.config.base_url.clone(),
        model: state.config.defaults.model.clone(),
    })
}

/// GET /
pub async fn root(State(state): State<Arc<ProxyState>>) -> Json<Value> {
    Json(json!({
        "status": "NVIDIA NIM Proxy Running",
        "model": state.config.defaults.model,
        "endpoints": {
            "/v1/chat/completions": "POST - Chat completions",
            "/v1/models": "GET - List models",
            "/health": "GET - Health check"
        },
        "usage": "Point your OpenAI-compatible client to this URL + /v1"
    }))
}

async fn log_request(
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let from = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!(
        "REQUEST: {} {} from {}",
        request.method(),
        request.uri().path(),
        from
    );
    next.run(request).await
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // CorsLayer answers every OPTIONS request with an empty body, so the
        // acknowledging preflight handler is registered outside of it.
        .route("/v1/chat/completions", options(chat_completions_preflight))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: ProxyConfig, host: &str, port: u16) -> anyhow::Result<()> {
    if !config.has_api_key() {
        warn!("NIM_API_KEY is not set; chat completions will fail until it is configured");
    }

    let base_url = config.base_url.clone();
    let key_configured = config.has_api_key();
    let state = Arc::new(ProxyState::new(config)?);
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                 NVIDIA NIM Chat Completions Proxy            ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Upstream:     {:45} ║", base_url);
    info!("║  Listening on: {:45} ║", addr);
    info!("║  API key set:  {:45} ║", key_configured);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    POST /v1/chat/completions - Chat completions              ║");
    info!("║    GET  /v1/models           - List models                   ║");
    info!("║    GET  /health              - Health check                  ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
