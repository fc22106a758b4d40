use crate::{
    api::{
        registry::ToolRegistry,
        types::{CallRequest, CallResponse, Capabilities, ErrorObj, ToolInfo},
    },
    config::Config,
    errors::{into_response, AppError},
    security::{self, RateLimiters},
};
use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<ToolRegistry>,
    pub rls: RateLimiters,
}

impl AppState {
    pub fn new(cfg: Config, registry: ToolRegistry) -> Self {
        let rls = RateLimiters::new(&cfg.rate);
        Self { cfg: Arc::new(cfg), registry: Arc::new(registry), rls }
    }
}

pub async fn serve(cfg: Config, registry: ToolRegistry) -> anyhow::Result<()> {
    let shared = AppState::new(cfg, registry);
    let addr: SocketAddr = format!("{}:{}", shared.cfg.server.bind_addr, shared.cfg.server.port)
        .parse()
        .context("parsing bind address")?;
    let app = build_router(shared);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(shared: AppState) -> Router {
    let base = shared.cfg.server.base_path.trim_end_matches('/').to_string();
    let limit_bytes = shared.cfg.limits.max_request_kb * 1024;
    Router::new()
        .route("/healthz", get(health))
        .route(&format!("{base}/capabilities"), get(capabilities))
        .route(&format!("{base}/call"), post(call).layer(RequestBodyLimitLayer::new(limit_bytes)))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))).into_response(),
        Err(e) => into_response(e).into_response(),
    }
}

async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return into_response(e).into_response();
    }
    let tools: Vec<ToolInfo> = state
        .registry
        .list_names()
        .into_iter()
        .filter_map(|n| state.registry.get(&n).map(|t| (n, t)))
        .map(|(name, t)| {
            let caps = t.capabilities();
            ToolInfo {
                name,
                description: t.description().to_string(),
                input_schema: caps["input"].clone(),
                output_schema: caps["output"].clone(),
            }
        })
        .collect();
    let caps = Capabilities {
        api_version: "1.0",
        data_root: state.registry.guard().root().to_string(),
        tools,
    };
    (StatusCode::OK, Json(caps)).into_response()
}

async fn call(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CallRequest>) -> Response {
    let audit = Audit::begin(&headers, &req.tool);

    if let Err(e) = admit(&state, &headers) {
        audit.finish("deny", e.code(), 0);
        return into_response(e).into_response();
    }
    let Some(tool) = state.registry.get(&req.tool) else {
        let e = AppError::NotFound(format!("tool '{}'", req.tool));
        audit.finish("deny", e.code(), 0);
        return into_response(e).into_response();
    };

    let (status, body) = match tool.call(req.params).await {
        Ok(result) => (StatusCode::OK, CallResponse { id: req.id, result: Some(result), error: None }),
        Err(e) => (
            e.status(),
            CallResponse {
                id: req.id,
                result: None,
                error: Some(ErrorObj { code: e.code().to_string(), message: e.to_string() }),
            },
        ),
    };
    let bytes_out = serde_json::to_vec(&body).map(|v| v.len()).unwrap_or(0) as u64;
    match &body.error {
        None => audit.finish("allow", "OK", bytes_out),
        Some(err) => audit.finish("error", &err.code, bytes_out),
    }
    (status, Json(body)).into_response()
}

/// One `audit` event per call.
struct Audit {
    request_id: String,
    origin: String,
    token_present: bool,
    tool: String,
    started: Instant,
}

impl Audit {
    fn begin(headers: &HeaderMap, tool: &str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            origin: headers
                .get(http::header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
            token_present: security::extract_bearer(headers).is_some(),
            tool: tool.to_string(),
            started: Instant::now(),
        }
    }

    fn finish(&self, decision: &str, code: &str, bytes_out: u64) {
        tracing::info!(
            request_id = %self.request_id,
            origin = %self.origin,
            token_present = self.token_present,
            tool = %self.tool,
            decision,
            code,
            duration_ms = self.started.elapsed().as_millis() as u64,
            bytes_out,
            "audit"
        );
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    security::require_bearer(headers, &state.cfg.auth.bearer_token)?;
    security::check_origin(headers, &state.cfg.auth.allowed_origins)?;
    Ok(())
}

fn admit(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    authorize(state, headers)?;
    security::content_length_ok(headers, state.cfg.limits.max_request_kb)?;
    let token = security::extract_bearer(headers);
    state.rls.check(token.as_deref())
}
