//! `modelrpc call`: invoke a demo method through the JSON-RPC router.

use modelrpc_core::rpc::RpcRouter;
use modelrpc_core::AppState;

use super::print_json;

/// Build and dispatch a single JSON-RPC request, returning the response.
pub async fn request(
    state: &AppState,
    method: &str,
    params_str: &str,
) -> Result<serde_json::Value, String> {
    let params: serde_json::Value =
        serde_json::from_str(params_str).map_err(|e| format!("Invalid JSON params: {}", e))?;

    let router = RpcRouter::new(state.clone());
    Ok(router
        .handle_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        }))
        .await)
}

pub async fn call(state: &AppState, method: &str, params_str: &str) -> Result<(), String> {
    let response = request(state, method, params_str).await?;
    print_json(&response);
    Ok(())
}
