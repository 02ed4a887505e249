//! Schema endpoints.
//!
//! - `GET /api/schema`: proto3 text; `?package=` picks one package
//! - `GET /api/schema.json`: the compiled schema document
//! - `GET /api/tools`: every method as a tool descriptor

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use modelrpc_core::json_schema::tool_descriptors;
use modelrpc_core::render::{render_package, render_proto};
use modelrpc_core::AppState;
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(proto_text))
}

#[derive(Debug, Deserialize)]
pub struct SchemaQuery {
    package: Option<String>,
}

async fn proto_text(
    State(state): State<AppState>,
    Query(query): Query<SchemaQuery>,
) -> axum::response::Response {
    let text = match query.package {
        Some(package) => {
            if !state.schema.packages().contains(&package) {
                return (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({ "error": format!("Unknown package: {}", package) })),
                )
                    .into_response();
            }
            render_package(&state.schema, &package)
        }
        None => render_proto(&state.schema)
            .into_iter()
            .map(|(package, text)| format!("// ---- {}.proto ----\n{}", package, text))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

pub async fn schema_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.schema.as_ref()).unwrap_or_default())
}

pub async fn tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools = tool_descriptors(&state.schema);
    Json(serde_json::json!({ "tools": tools }))
}
