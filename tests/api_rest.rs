// tests/api_rest.rs
//
// REST adapter via tower::ServiceExt::oneshot (no sockets).
//
// Covered:
// - GET /health, /status, /tools, /tools/{name}/schema, /docs
// - POST /tools/analyze_crypto_sentiment (success, validation error)
// - POST /tools/{name} with an unknown name is 404
// - unknown route is 404 with the envelope

mod common;

use serde_json::{json, Value};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt as _;

use crypto_sentiment_gateway::api::{self, connections::ConnectionRegistry, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    let (_src, orch) = common::bullish_orchestrator();
    let state = AppState::new(common::dispatcher(orch), Arc::new(ConnectionRegistry::new()));
    api::router(state)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, v)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST")
}

fn assert_envelope(v: &Value, success: bool) {
    assert_eq!(v["success"], success, "envelope: {v}");
    assert!(v["request_id"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(v["processing_time_ms"].is_u64());
    assert!(v["timestamp"].is_string());
}

#[tokio::test]
async fn health_is_ok() {
    let (status, v) = send(test_router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
}

#[tokio::test]
async fn status_reports_cache_and_connections() {
    let (status, v) = send(test_router(), get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&v, true);
    assert_eq!(v["data"]["websocket_connections"], 0);
    assert_eq!(v["data"]["cache"]["durable"], Value::Null);
    // AI is off in the test wiring, so only the four local stages are listed.
    assert_eq!(v["data"]["stages"].as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn tools_and_schema() {
    let (status, v) = send(test_router(), get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["tools"][0]["name"], "analyze_crypto_sentiment");

    let (status, v) = send(test_router(), get("/tools/analyze_crypto_sentiment/schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["inputSchema"]["required"], json!(["query"]));

    let (status, v) = send(test_router(), get("/tools/nope/schema")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&v, false);
    assert_eq!(v["error"]["code"], "TOOL_NOT_FOUND");
}

#[tokio::test]
async fn docs_lists_routes() {
    let (status, v) = send(test_router(), get("/docs")).await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = v["routes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["path"].as_str())
        .collect();
    for p in ["/health", "/mcp", "/mcp/batch", "/ws", "/tools/analyze_crypto_sentiment"] {
        assert!(paths.contains(&p), "missing {p}");
    }
}

#[tokio::test]
async fn analyze_returns_verdict_in_envelope() {
    let body = r#"{"query":"bitcoin ETF","analysis_depth":"quick","focus_coins":["BTC"]}"#;
    let (status, v) = send(
        test_router(),
        post_json("/tools/analyze_crypto_sentiment", body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&v, true);
    let data = &v["data"];
    for field in [
        "overall_sentiment",
        "confidence_score",
        "market_signals",
        "behavioral_insights",
        "risk_assessment",
        "actionable_recommendations",
    ] {
        assert!(data.get(field).is_some(), "missing {field}");
    }
}

#[tokio::test]
async fn invalid_arguments_are_400() {
    let (status, v) = send(
        test_router(),
        post_json("/tools/analyze_crypto_sentiment", r#"{"query":"x","max_news_items":500}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&v, false);
    assert_eq!(v["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        test_router(),
        post_json("/tools/analyze_crypto_sentiment", "{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generic_tool_route_rejects_unknown_names() {
    let (status, v) = send(test_router(), post_json("/tools/unknown_tool", r#"{"query":"eth"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&v, false);
    assert_eq!(v["error"]["code"], "TOOL_NOT_FOUND");
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let (status, v) = send(test_router(), get("/definitely/not/here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&v, false);
    assert_eq!(v["error"]["code"], "NOT_FOUND");
}
