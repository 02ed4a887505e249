pub mod connect;
pub mod rpc;
pub mod schema;

use axum::Router;
use modelrpc_core::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/rpc", rpc::router())
        .nest("/api/schema", schema::router())
        .route("/api/schema.json", axum::routing::get(schema::schema_json))
        .route("/api/tools", axum::routing::get(schema::tools))
        .merge(connect::router())
}
