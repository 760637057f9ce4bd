//! JSON-RPC 2.0 framing shared by every adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// No id: the sender expects no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn id_or_null(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&GatewayError> for RpcError {
    fn from(e: &GatewayError) -> Self {
        Self {
            code: e.rpc_code(),
            message: e.to_string(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, e: &GatewayError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError::from(e)),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Validate framing before anything else looks at the message.
/// On failure the error comes with whatever id could be recovered.
pub fn parse_request(v: &Value) -> Result<RpcRequest, (Value, GatewayError)> {
    let Some(obj) = v.as_object() else {
        return Err((
            Value::Null,
            GatewayError::InvalidRequest("request must be a JSON object".into()),
        ));
    };
    let id = obj.get("id").cloned().unwrap_or(Value::Null);
    if !matches!(id, Value::Null | Value::String(_) | Value::Number(_)) {
        return Err((
            Value::Null,
            GatewayError::InvalidRequest("id must be a string, number or null".into()),
        ));
    }

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => {
            return Err((
                id,
                GatewayError::InvalidRequest("jsonrpc must be \"2.0\"".into()),
            ))
        }
    }

    let method = match obj.get("method") {
        Some(Value::String(m)) if !m.trim().is_empty() => m.clone(),
        _ => {
            return Err((
                id,
                GatewayError::InvalidRequest("method is required".into()),
            ))
        }
    };

    Ok(RpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: obj.get("id").cloned(),
        method,
        params: obj.get("params").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc_codes;
    use serde_json::json;

    #[test]
    fn framing_errors_keep_the_id() {
        let (id, e) = parse_request(&json!({"jsonrpc": "1.0", "id": 7, "method": "x"})).unwrap_err();
        assert_eq!(id, json!(7));
        assert_eq!(e.rpc_code(), rpc_codes::INVALID_REQUEST);

        let (id, _) = parse_request(&json!({"jsonrpc": "2.0", "id": "a"})).unwrap_err();
        assert_eq!(id, json!("a"));

        let (id, _) = parse_request(&json!([1, 2])).unwrap_err();
        assert_eq!(id, Value::Null);
    }

    #[test]
    fn notifications_have_no_id() {
        let r = parse_request(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .unwrap();
        assert!(r.is_notification());
        let r = parse_request(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).unwrap();
        assert!(!r.is_notification());
    }

    #[test]
    fn error_response_shape() {
        let resp = RpcResponse::err(json!(3), &GatewayError::MethodNotFound("nope".into()));
        let v = resp.to_value();
        assert_eq!(v["error"]["code"], -32601);
        assert!(v.get("result").is_none());
        assert_eq!(v["jsonrpc"], "2.0");
    }
}
