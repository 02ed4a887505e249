//! modelrpc Server: HTTP/JSON adapter for compiled services.
//!
//! Serves an `AppState` from `modelrpc-core` over axum:
//! - Connect-style JSON calls at `POST /{package.Service}/{Method}`
//! - JSON-RPC 2.0 at `POST /api/rpc`
//! - the compiled schema as proto text, JSON and tool descriptors
//!
//! This crate can be used standalone or embedded in other applications.

pub mod api;

use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use modelrpc_core::render::write_proto_files;
use modelrpc_core::AppState;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Configuration for the modelrpc HTTP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Package for services that do not declare a namespace.
    pub package: Option<String>,
    /// When set, the compiled schema is written here as `<package>.proto`
    /// at startup.
    pub proto_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            package: None,
            proto_dir: None,
        }
    }
}

impl ServerConfig {
    /// Parse a YAML config. Missing keys keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self, String> {
        serde_yaml::from_str(text).map_err(|e| format!("Invalid server config: {}", e))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_yaml(&text)
    }
}

/// Initialize tracing from `RUST_LOG`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "modelrpc_server=info,modelrpc_core=info,tower_http=info".into()
            }),
        )
        .try_init();
}

/// Start the HTTP server for an already-built `AppState`.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig, state: AppState) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "Starting modelrpc server on {}:{}",
        config.host,
        config.port
    );

    if let Some(dir) = &config.proto_dir {
        let written = write_proto_files(&state.schema, Path::new(dir))
            .map_err(|e| format!("Failed to write proto files to {}: {}", dir, e))?;
        tracing::info!("Wrote {} proto file(s) to {}", written.len(), dir);
    }

    for rejected in state.rejected() {
        tracing::warn!("Skipped method: {}", rejected);
    }

    start_server_with_state(config, state).await
}

/// Build the complete axum application for a state.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve in a background task.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("modelrpc server listening on {}", local_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "modelrpc-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml("port: 8080\nproto_dir: out/proto\n")
            .expect("config should parse");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.proto_dir.as_deref(), Some("out/proto"));
        assert!(config.package.is_none());
    }

    #[test]
    fn test_config_rejects_bad_yaml() {
        assert!(ServerConfig::from_yaml("port: [1, 2]").is_err());
    }
}
