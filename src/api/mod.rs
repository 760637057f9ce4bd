//! HTTP surface: REST, JSON-RPC over HTTP and WebSocket on one router.

pub mod connections;
pub mod rest;
pub mod rpc;
pub mod ws;

use std::sync::Arc;
use std::time::Instant;

use shuttle_axum::axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::protocol::ToolDispatcher;
use connections::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: ToolDispatcher,
    pub connections: Arc<ConnectionRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(dispatcher: ToolDispatcher, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            dispatcher,
            connections,
            started_at: Instant::now(),
        }
    }
}

/// `(method, path, summary)` for every route; served by `/docs`.
pub const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Liveness probe."),
    ("GET", "/status", "Uptime, version, cache tier and WebSocket connections."),
    ("GET", "/tools", "Tool definitions."),
    ("GET", "/tools/{name}/schema", "Input schema of one tool."),
    ("GET", "/docs", "This listing."),
    ("GET", "/metrics", "Prometheus exposition."),
    (
        "POST",
        "/tools/analyze_crypto_sentiment",
        "Run an analysis; body is the tool arguments.",
    ),
    ("POST", "/tools/{name}", "Generic tool call; unknown names are 404."),
    ("POST", "/mcp", "One JSON-RPC 2.0 message."),
    ("POST", "/mcp/batch", "Array of JSON-RPC 2.0 messages."),
    ("GET", "/ws", "WebSocket upgrade (JSON-RPC messages)."),
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        .route("/status", get(rest::status))
        .route("/tools", get(rest::list_tools))
        .route("/tools/{name}/schema", get(rest::tool_schema))
        .route("/docs", get(rest::docs))
        .route("/metrics", get(rest::metrics))
        .route("/tools/analyze_crypto_sentiment", post(rest::analyze))
        .route("/tools/{name}", post(rest::call_named))
        .route("/mcp", post(rpc::single))
        .route("/mcp/batch", post(rpc::batch))
        .route("/ws", get(ws::upgrade))
        .fallback(rest::not_found)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
