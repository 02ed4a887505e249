//! JSON-RPC 2.0 wire objects.
//!
//! Plain serde types with no transport attached, so the same values travel
//! over HTTP, stdio or an in-process call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Number or string. Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// `Service.Method`, `pkg.Service.Method` or `pkg.Service/Method`.
    pub method: String,
    /// The request message, or an array of messages for client-streaming
    /// methods.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    /// `{"status": ..., "details": ...}` for failures raised by a call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Protocol-defined codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// Server range: -32000 to -32099
pub const CALL_FAILED: i64 = -32000;
pub const NOT_FOUND: i64 = -32001;
pub const BAD_REQUEST: i64 = -32002;
pub const CANCELLED: i64 = -32003;
pub const UNAVAILABLE: i64 = -32004;
pub const PERMISSION_DENIED: i64 = -32005;

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn error_with_data(
        id: Option<Value>,
        code: i64,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        let mut response = Self::error(id, code, message);
        if let Some(error) = response.error.as_mut() {
            error.data = Some(data);
        }
        response
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
