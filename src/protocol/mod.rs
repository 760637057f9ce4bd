//! # Protocol
//! Transport-independent handling of the three logical operations
//! (`initialize`, `tools/list`, `tools/call`). Adapters own framing and
//! delivery; they hand parsed messages to [`ToolDispatcher`].

pub mod jsonrpc;
pub mod stream;
pub mod tool;

use metrics::counter;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::GatewayError;
use crate::invocation::Invocation;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressReporter;
use crate::verdict::Verdict;
use jsonrpc::{parse_request, RpcRequest, RpcResponse};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "crypto-sentiment-gateway";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    HttpRpc,
    Rest,
    WebSocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::HttpRpc => "http_rpc",
            Transport::Rest => "rest",
            Transport::WebSocket => "websocket",
        }
    }
}

/// Called with every verdict a tool call produced (cache hits included).
pub type VerdictObserver = Arc<dyn Fn(&Verdict) + Send + Sync>;

#[derive(Clone)]
pub struct ToolDispatcher {
    orchestrator: Arc<Orchestrator>,
    observer: Option<VerdictObserver>,
}

impl ToolDispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: VerdictObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Side-effect free; safe to call repeatedly.
    pub fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
            "capabilities": { "tools": { "listChanged": false } }
        })
    }

    pub fn list_tools(&self) -> Value {
        json!({ "tools": [tool::definition()] })
    }

    /// Validate `arguments` and run the analysis. Validation errors never
    /// reach the orchestrator.
    pub async fn analyze(
        &self,
        arguments: &Value,
        progress: &ProgressReporter,
        transport: Transport,
    ) -> Result<Verdict, GatewayError> {
        let inv = Invocation::from_arguments(arguments)?;
        counter!("gateway_requests_total", "transport" => transport.as_str()).increment(1);
        let verdict = self.orchestrator.execute(&inv, progress).await;
        if let Some(observe) = &self.observer {
            observe(&verdict);
        }
        Ok(verdict)
    }

    /// `tools/call` params: `{name, arguments}`.
    pub async fn call_tool(
        &self,
        params: Option<&Value>,
        progress: &ProgressReporter,
        transport: Transport,
    ) -> Result<Value, GatewayError> {
        let params = params.unwrap_or(&Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Validation("params.name is required".into()))?;
        if name != tool::TOOL_NAME {
            return Err(GatewayError::ToolNotFound(name.to_string()));
        }
        let args = params.get("arguments").unwrap_or(&Value::Null);
        let verdict = self.analyze(args, progress, transport).await?;
        Ok(tool_result(&verdict))
    }

    /// One parsed request. `None` for notifications.
    pub async fn handle(
        &self,
        req: RpcRequest,
        progress: &ProgressReporter,
        transport: Transport,
    ) -> Option<RpcResponse> {
        debug!(method = %req.method, transport = transport.as_str(), "rpc request");
        let result = match req.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => {
                self.call_tool(req.params.as_ref(), progress, transport)
                    .await
            }
            "ping" => Ok(json!({})),
            m if req.is_notification() && m.starts_with("notifications/") => return None,
            other => Err(GatewayError::MethodNotFound(other.to_string())),
        };
        if req.is_notification() {
            return None;
        }
        let id = req.id_or_null();
        Some(match result {
            Ok(v) => RpcResponse::ok(id, v),
            Err(e) => RpcResponse::err(id, &e),
        })
    }

    /// Framing validation plus dispatch for one JSON value.
    pub async fn handle_value(
        &self,
        v: Value,
        progress: &ProgressReporter,
        transport: Transport,
    ) -> Option<RpcResponse> {
        match parse_request(&v) {
            Ok(req) => self.handle(req, progress, transport).await,
            Err((id, e)) => Some(RpcResponse::err(id, &e)),
        }
    }

    /// Raw text in, serialized response out (stream adapter).
    pub async fn handle_text(&self, line: &str, transport: Transport) -> Option<String> {
        let resp = match serde_json::from_str::<Value>(line) {
            Ok(v) => {
                self.handle_value(v, &ProgressReporter::disabled(), transport)
                    .await?
            }
            Err(e) => RpcResponse::err(Value::Null, &GatewayError::Parse(e.to_string())),
        };
        serde_json::to_string(&resp).ok()
    }
}

/// `{content:[{type:"text", text:<verdict json>}]}`
pub fn tool_result(v: &Verdict) -> Value {
    json!({ "content": [ { "type": "text", "text": v.to_text() } ] })
}
