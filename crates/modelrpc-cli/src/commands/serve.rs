//! `modelrpc serve`: serve the demo services over HTTP.

use modelrpc_server::ServerConfig;

/// Command-line values that override the config file.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub package: Option<String>,
    pub proto_dir: Option<String>,
}

/// Load the config file (if any) and apply command-line overrides on top.
pub fn resolve_config(
    config_path: Option<&str>,
    overrides: ServeOverrides,
) -> Result<ServerConfig, String> {
    let mut config = match config_path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = overrides.host {
        config.host = host;
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if overrides.package.is_some() {
        config.package = overrides.package;
    }
    if overrides.proto_dir.is_some() {
        config.proto_dir = overrides.proto_dir;
    }
    Ok(config)
}

pub async fn run(config_path: Option<String>, overrides: ServeOverrides) -> Result<(), String> {
    let config = resolve_config(config_path.as_deref(), overrides)?;
    tracing::info!(
        "[Serve] Config resolved from {}",
        config_path.as_deref().unwrap_or("defaults")
    );
    let state = crate::demo::demo_state(config.package.as_deref())?;
    tracing::info!(
        "[Serve] Demo services compiled: {} methods in {} packages",
        state.method_list().len(),
        state.schema.packages().len()
    );

    println!("Starting modelrpc server on {}:{}...", config.host, config.port);

    let addr = modelrpc_server::start_server(config, state.clone()).await?;
    println!("modelrpc server listening on http://{}", addr);
    for path in state.method_list() {
        println!("  POST {}", path);
    }

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    tracing::info!("[Serve] Ctrl+C received, shutting down");
    println!("\nShutting down...");
    Ok(())
}
