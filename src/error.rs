//! Gateway error taxonomy.
//!
//! Only errors that cross an adapter boundary live here. Upstream failures
//! (news/price sources, durable cache, AI provider) are recovered inside the
//! fetchers, the cache tier and the stage runners and never reach this type.

use shuttle_axum::axum::http::StatusCode;
use thiserror::Error;

/// JSON-RPC 2.0 error codes used by every adapter.
pub mod rpc_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed tool arguments; never reaches the orchestrator.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Bad JSON-RPC framing (version, missing method, non-object).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn rpc_code(&self) -> i64 {
        match self {
            GatewayError::Validation(_) => rpc_codes::INVALID_PARAMS,
            GatewayError::ToolNotFound(_) | GatewayError::MethodNotFound(_) => {
                rpc_codes::METHOD_NOT_FOUND
            }
            GatewayError::InvalidRequest(_) => rpc_codes::INVALID_REQUEST,
            GatewayError::Parse(_) => rpc_codes::PARSE_ERROR,
            GatewayError::Internal(_) => rpc_codes::INTERNAL_ERROR,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_)
            | GatewayError::InvalidRequest(_)
            | GatewayError::Parse(_) => StatusCode::BAD_REQUEST,
            GatewayError::ToolNotFound(_) | GatewayError::MethodNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the REST envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            GatewayError::MethodNotFound(_) => "METHOD_NOT_FOUND",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::Parse(_) => "PARSE_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}
