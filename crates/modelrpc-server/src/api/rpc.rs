//! JSON-RPC 2.0 endpoint powered by `modelrpc_core::rpc`.
//!
//! Exposes `POST /api/rpc` for every compiled method (`Service.Method`),
//! and `GET /api/rpc/methods` for discovery.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use modelrpc_core::rpc::RpcRouter;
use modelrpc_core::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/methods", get(list_methods))
}

/// POST /api/rpc: single or batch JSON-RPC request.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let rpc = RpcRouter::new(state);
    Json(rpc.handle_value(body).await)
}

/// GET /api/rpc/methods: JSON-RPC names and routing paths.
async fn list_methods(State(state): State<AppState>) -> Json<serde_json::Value> {
    let paths = state.method_list();
    let rpc = RpcRouter::new(state);
    Json(serde_json::json!({ "methods": rpc.method_list(), "paths": paths }))
}
