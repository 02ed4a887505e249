//! JSON-RPC 2.0 front end for the dispatcher.
//!
//! `RpcRouter` wraps an `AppState` and turns JSON-RPC requests into calls.
//! It has no HTTP dependency, so the same router serves:
//!
//! - the axum endpoint at `/api/rpc`
//! - the `modelrpc call` command
//! - in-process callers and tests

use serde_json::Value;

use crate::context::CallContext;
use crate::state::{AppState, MethodEntry};

use super::error::RpcError;
use super::types::*;

/// Transport-agnostic JSON-RPC router.
///
/// ```ignore
/// let router = RpcRouter::new(app_state);
/// let response = router.handle_request(r#"{
///     "jsonrpc": "2.0",
///     "id": 1,
///     "method": "Greeter.SayHello",
///     "params": { "name": "Ada" }
/// }"#).await;
/// ```
#[derive(Clone)]
pub struct RpcRouter {
    state: AppState,
}

const SERIALIZE_FAILED: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Failed to serialize response"},"id":null}"#;

impl RpcRouter {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Parse, dispatch and serialize. Accepts single and batch requests.
    pub async fn handle_request(&self, raw: &str) -> String {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                return serde_json::to_string(&JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
                .unwrap_or_else(|_| SERIALIZE_FAILED.into());
            }
        };
        let response = self.handle_value(value).await;
        serde_json::to_string(&response).unwrap_or_else(|_| SERIALIZE_FAILED.into())
    }

    /// Handle an already-parsed request or batch.
    pub async fn handle_value(&self, value: Value) -> Value {
        match value {
            Value::Array(batch) => {
                if batch.is_empty() {
                    let response =
                        JsonRpcResponse::error(None, INVALID_REQUEST, "Empty batch request");
                    return serde_json::to_value(response).unwrap_or_default();
                }
                let mut responses = Vec::with_capacity(batch.len());
                for item in batch {
                    responses.push(self.handle_single(item).await);
                }
                Value::Array(responses)
            }
            single => self.handle_single(single).await,
        }
    }

    async fn handle_single(&self, value: Value) -> Value {
        let response = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                JsonRpcResponse::error(None, INVALID_REQUEST, format!("Invalid request: {}", e))
            }
        };
        serde_json::to_value(response).unwrap_or_default()
    }

    pub async fn dispatch(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        if req.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                req.id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version, expected \"2.0\"",
            );
        }

        let id = req.id.clone();
        match self.route(&req.method, req.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => err.to_response(id),
        }
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let entry = self
            .state
            .method(method)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))?;
        let requests = requests_for(entry, params)?;
        let shape = entry.descriptor.cardinality;

        let ctx = CallContext::new(entry.path.clone());
        let mut responses = self.state.call(&entry.path, requests, ctx).await?;

        if shape.server_streaming() {
            return Ok(Value::Array(responses));
        }
        responses
            .pop()
            .ok_or_else(|| RpcError::InvalidRequest(format!("{} produced no response", method)))
    }

    /// `Service.Method` names of every method.
    pub fn method_list(&self) -> Vec<String> {
        self.state
            .methods()
            .iter()
            .map(|m| {
                let service = m.service.rsplit('.').next().unwrap_or(&m.service);
                format!("{}.{}", service, m.descriptor.name)
            })
            .collect()
    }
}

/// Client-streaming methods take an array of messages; everything else
/// takes one message, defaulting to `{}`.
fn requests_for(entry: &MethodEntry, params: Option<Value>) -> Result<Vec<Value>, RpcError> {
    if !entry.descriptor.cardinality.client_streaming() {
        return Ok(vec![params.unwrap_or_else(|| Value::Object(Default::default()))]);
    }
    match params {
        Some(Value::Array(items)) => Ok(items),
        None => Ok(Vec::new()),
        Some(_) => Err(RpcError::InvalidParams(format!(
            "{} is client-streaming, params must be an array of messages",
            entry.descriptor.name
        ))),
    }
}
