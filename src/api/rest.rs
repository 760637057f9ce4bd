//! REST adapter. Every tool route answers with the same envelope:
//! `{success, data | error{code, message}, request_id, processing_time_ms, timestamp}`.

use serde::Serialize;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{AppState, ROUTES};
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::progress::ProgressReporter;
use crate::protocol::{self, tool, Transport};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub request_id: String,
    pub processing_time_ms: u64,
    pub timestamp: String,
}

fn since(t0: Instant) -> u64 {
    t0.elapsed().as_millis().min(u64::MAX as u128) as u64
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, t0: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id: Uuid::new_v4().to_string(),
            processing_time_ms: since(t0),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Envelope<Value> {
    pub fn fail(code: &str, message: impl Into<String>, t0: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
            request_id: Uuid::new_v4().to_string(),
            processing_time_ms: since(t0),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn ok_response<T: Serialize>(data: T, t0: Instant) -> Response {
    (StatusCode::OK, Json(Envelope::ok(data, t0))).into_response()
}

fn error_response(err: &GatewayError, t0: Instant) -> Response {
    (
        err.http_status(),
        Json(Envelope::fail(err.code(), err.to_string(), t0)),
    )
        .into_response()
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().to_rfc3339() }))
}

pub async fn status(State(state): State<AppState>) -> Response {
    let t0 = Instant::now();
    let orch = state.dispatcher.orchestrator();
    let data = json!({
        "service": protocol::SERVER_NAME,
        "version": protocol::SERVER_VERSION,
        "protocol_version": protocol::PROTOCOL_VERSION,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "cache": orch.cache().status(),
        "websocket_connections": state.connections.len(),
        "stages": orch.stage_names(),
        "news_sources": orch.news_sources(),
        "price_sources": orch.price_sources(),
    });
    ok_response(data, t0)
}

pub async fn list_tools(State(state): State<AppState>) -> Response {
    let t0 = Instant::now();
    ok_response(state.dispatcher.list_tools(), t0)
}

pub async fn tool_schema(Path(name): Path<String>) -> Response {
    let t0 = Instant::now();
    if name != tool::TOOL_NAME {
        return error_response(&GatewayError::ToolNotFound(name), t0);
    }
    ok_response(json!({ "name": name, "inputSchema": tool::input_schema() }), t0)
}

pub async fn docs() -> Json<Value> {
    let routes: Vec<Value> = ROUTES
        .iter()
        .map(|(method, path, summary)| json!({ "method": method, "path": path, "summary": summary }))
        .collect();
    Json(json!({
        "service": protocol::SERVER_NAME,
        "version": protocol::SERVER_VERSION,
        "routes": routes,
        "jsonrpc_methods": ["initialize", "tools/list", "tools/call", "ping"],
        "websocket_methods": ["initialize", "tools/list", "tools/call", "subscribe", "unsubscribe", "ping"],
        "tools": [tool::definition()],
    }))
}

pub async fn metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Metrics::render(),
    )
        .into_response()
}

/// Body is the tool arguments object.
pub async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    run_analysis(&state, &body).await
}

/// Known names go to the tool route; anything else is 404.
pub async fn call_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if name != tool::TOOL_NAME {
        return error_response(&GatewayError::ToolNotFound(name), Instant::now());
    }
    run_analysis(&state, &body).await
}

async fn run_analysis(state: &AppState, body: &[u8]) -> Response {
    let t0 = Instant::now();
    let args: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                let err = GatewayError::Validation(format!("body is not valid JSON: {e}"));
                return error_response(&err, t0);
            }
        }
    };
    match state
        .dispatcher
        .analyze(&args, &ProgressReporter::disabled(), Transport::Rest)
        .await
    {
        Ok(verdict) => ok_response(verdict, t0),
        Err(e) => {
            debug!(error = %e, "rest analysis rejected");
            error_response(&e, t0)
        }
    }
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope::fail("NOT_FOUND", "route not found", Instant::now())),
    )
        .into_response()
}
