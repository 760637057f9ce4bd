//! JSON-RPC over HTTP.
//!
//! `/mcp` takes one message and always answers 200 with a JSON-RPC body
//! (errors included). `/mcp/batch` takes an array; entries resolve
//! independently and come back in request order. Notifications get no
//! entry, as JSON-RPC 2.0 prescribes.

use futures_util::future::join_all;
use serde_json::Value;
use shuttle_axum::axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use super::AppState;
use crate::error::GatewayError;
use crate::progress::ProgressReporter;
use crate::protocol::jsonrpc::RpcResponse;
use crate::protocol::Transport;

fn parse_body(body: &[u8]) -> Result<Value, RpcResponse> {
    serde_json::from_slice(body)
        .map_err(|e| RpcResponse::err(Value::Null, &GatewayError::Parse(e.to_string())))
}

pub async fn single(State(state): State<AppState>, body: Bytes) -> Response {
    let msg = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return Json(resp).into_response(),
    };
    if msg.is_array() {
        let err = GatewayError::InvalidRequest("arrays go to /mcp/batch".into());
        return Json(RpcResponse::err(Value::Null, &err)).into_response();
    }
    match state
        .dispatcher
        .handle_value(msg, &ProgressReporter::disabled(), Transport::HttpRpc)
        .await
    {
        Some(resp) => Json(resp).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn batch(State(state): State<AppState>, body: Bytes) -> Response {
    let msg = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return Json(resp).into_response(),
    };
    let entries = match msg {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            let err = GatewayError::InvalidRequest("batch must be a non-empty array".into());
            return (StatusCode::BAD_REQUEST, Json(RpcResponse::err(Value::Null, &err)))
                .into_response();
        }
    };

    debug!(size = entries.len(), "rpc batch");
    let dispatcher = &state.dispatcher;
    let replies = join_all(entries.into_iter().map(|entry| async move {
        dispatcher
            .handle_value(entry, &ProgressReporter::disabled(), Transport::HttpRpc)
            .await
    }))
    .await;

    let out: Vec<RpcResponse> = replies.into_iter().flatten().collect();
    if out.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(out).into_response()
}
