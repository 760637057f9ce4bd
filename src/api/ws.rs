//! WebSocket adapter.
//!
//! Per connection: CONNECTED (welcome sent) → INITIALIZED (after
//! `initialize`) → message loop → CLOSED. Each text frame is one JSON-RPC
//! message; replies and progress notifications go through the connection's
//! outbound queue in the registry, so a connection the heartbeat removed
//! receives nothing further.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use super::connections::{ConnectionId, ConnectionRegistry, Outbound};
use super::AppState;
use crate::error::GatewayError;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::protocol::jsonrpc::{parse_request, RpcRequest, RpcResponse, JSONRPC_VERSION};
use crate::protocol::{self, Transport, VerdictObserver};
use crate::verdict::{RiskLevel, Verdict};

const PROGRESS_BUFFER: usize = 64;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let id = state.connections.register(tx);
    info!(%id, "ws connected");

    state.connections.deliver(&id, Outbound::Text(welcome(&id).to_string()));

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let res = match frame {
                Outbound::Text(t) => sink.send(Message::Text(t.into())).await,
                Outbound::Ping => sink.send(Message::Ping(Default::default())).await,
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if res.is_err() {
                break;
            }
        }
    });

    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let st = reader_state.clone();
                    let text = text.as_str().to_owned();
                    // Long analyses must not block pongs.
                    tokio::spawn(async move {
                        if let Some(reply) = on_text(&st, id, &text).await {
                            st.connections.deliver(&id, Outbound::Text(reply.to_string()));
                        }
                    });
                }
                Ok(Message::Pong(_)) => reader_state.connections.touch(&id),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(%id, error = %e, "ws read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    state.connections.remove(&id);
    info!(%id, "ws closed");
}

/// Push a summary of every verdict to `sentiment_updates` subscribers, and
/// an alert to `market_alerts` subscribers when risk is HIGH.
pub fn verdict_broadcaster(registry: Arc<ConnectionRegistry>) -> VerdictObserver {
    Arc::new(move |v: &Verdict| {
        let update = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": "sentiment_update",
            "params": {
                "overall_sentiment": v.overall_sentiment,
                "confidence_score": v.confidence_score,
                "timestamp": v.timestamp,
            }
        });
        let n = registry.broadcast("sentiment_updates", &update.to_string());
        if v.risk_assessment.level == RiskLevel::High {
            let alert = json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": "market_alert",
                "params": {
                    "level": v.risk_assessment.level,
                    "factors": v.risk_assessment.factors,
                    "timestamp": v.timestamp,
                }
            });
            registry.broadcast("market_alerts", &alert.to_string());
        }
        if n > 0 {
            debug!(subscribers = n, "verdict broadcast");
        }
    })
}

fn welcome(id: &ConnectionId) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": "welcome",
        "params": {
            "connection_id": id.to_string(),
            "server": { "name": protocol::SERVER_NAME, "version": protocol::SERVER_VERSION },
            "protocolVersion": protocol::PROTOCOL_VERSION,
        }
    })
}

fn progress_notification(request_id: &Value, ev: &ProgressEvent) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": "progress",
        "params": {
            "request_id": request_id,
            "phase": ev.phase,
            "percent": ev.percent,
            "message": ev.message,
            "stage": ev.stage,
        }
    })
}

fn topics_param(req: &RpcRequest) -> Result<Vec<String>, GatewayError> {
    let topics = req
        .params
        .as_ref()
        .and_then(|p| p.get("topics"))
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::Validation("params.topics must be an array".into()))?;
    Ok(topics
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

/// One inbound text frame; `None` for notifications.
pub async fn on_text(state: &AppState, conn: ConnectionId, text: &str) -> Option<Value> {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return Some(RpcResponse::err(Value::Null, &GatewayError::Parse(e.to_string())).to_value())
        }
    };
    let req = match parse_request(&msg) {
        Ok(r) => r,
        Err((id, e)) => return Some(RpcResponse::err(id, &e).to_value()),
    };
    let id = req.id_or_null();
    let registry = &state.connections;

    let result: Result<Value, GatewayError> = match req.method.as_str() {
        "initialize" => {
            registry.mark_initialized(&conn);
            Ok(state.dispatcher.initialize())
        }
        "subscribe" => topics_param(&req)
            .map(|t| json!({ "subscriptions": registry.subscribe(&conn, &t) })),
        "unsubscribe" => topics_param(&req)
            .map(|t| json!({ "subscriptions": registry.unsubscribe(&conn, &t) })),
        "ping" => {
            registry.touch(&conn);
            Ok(json!({ "pong": true, "timestamp": chrono::Utc::now().to_rfc3339() }))
        }
        "tools/call" if wants_stream(&req) && !req.is_notification() => {
            call_streaming(state, conn, &req).await
        }
        _ => {
            return state
                .dispatcher
                .handle(req, &ProgressReporter::disabled(), Transport::WebSocket)
                .await
                .map(|r| r.to_value())
        }
    };

    if req.is_notification() {
        return None;
    }
    Some(match result {
        Ok(v) => RpcResponse::ok(id, v).to_value(),
        Err(e) => RpcResponse::err(id, &e).to_value(),
    })
}

fn wants_stream(req: &RpcRequest) -> bool {
    req.params
        .as_ref()
        .and_then(|p| p.get("arguments"))
        .and_then(|a| a.get("stream_updates"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Run `tools/call` while forwarding progress events to the caller. Every
/// event emitted before the verdict is delivered before the final reply.
async fn call_streaming(
    state: &AppState,
    conn: ConnectionId,
    req: &RpcRequest,
) -> Result<Value, GatewayError> {
    let request_id = req.id_or_null();
    let (reporter, mut rx) = ProgressReporter::channel(PROGRESS_BUFFER);
    let forward = |ev: &ProgressEvent| {
        let frame = progress_notification(&request_id, ev).to_string();
        state.connections.deliver(&conn, Outbound::Text(frame));
    };

    let call = state
        .dispatcher
        .call_tool(req.params.as_ref(), &reporter, Transport::WebSocket);
    tokio::pin!(call);

    let result = loop {
        tokio::select! {
            biased;
            ev = rx.recv() => match ev {
                Ok(ev) => forward(&ev),
                Err(RecvError::Lagged(n)) => debug!(%conn, skipped = n, "progress lagged"),
                Err(RecvError::Closed) => break (&mut call).await,
            },
            res = &mut call => break res,
        }
    };
    while let Ok(ev) = rx.try_recv() {
        forward(&ev);
    }
    result
}
