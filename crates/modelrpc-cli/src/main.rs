//! modelrpc CLI: inspect, serve and call the bundled demo services.
//!
//! Reuses the schema compiler and dispatcher (modelrpc-core) and the HTTP
//! bootstrap (modelrpc-server).

use clap::{Parser, Subcommand};
use modelrpc_cli::commands::{self, schema::SchemaFormat, serve::ServeOverrides};
use modelrpc_cli::demo;

/// modelrpc: typed services, compiled to proto3 and served as JSON
#[derive(Parser)]
#[command(name = "modelrpc", version, about = "modelrpc: typed services, compiled to proto3 and served as JSON")]
pub struct Cli {
    /// Package for services that do not declare a namespace
    #[arg(long, env = "MODELRPC_PACKAGE")]
    package: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo services over HTTP
    Serve {
        /// YAML config file
        #[arg(long, env = "MODELRPC_CONFIG")]
        config: Option<String>,
        /// Host to bind to
        #[arg(long, env = "MODELRPC_HOST")]
        host: Option<String>,
        /// Port to listen on
        #[arg(long, env = "MODELRPC_PORT")]
        port: Option<u16>,
        /// Write `<package>.proto` files here at startup
        #[arg(long, env = "MODELRPC_PROTO_PATH")]
        proto_dir: Option<String>,
    },

    /// Print or write the compiled schema
    Schema {
        /// Output format
        #[arg(long, value_enum, default_value = "proto")]
        format: SchemaFormat,
        /// Only print this package (proto format)
        #[arg(long)]
        only: Option<String>,
        /// Write files to this directory instead of printing
        #[arg(long)]
        out: Option<String>,
    },

    /// Invoke a method through the JSON-RPC router
    Call {
        /// Method name (e.g. "Greeter.SayHello")
        #[arg(long)]
        method: String,
        /// Params as a JSON string; an array for client-streaming methods
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "modelrpc_core=warn,modelrpc_server=info,modelrpc_cli=info".into()
            }),
        )
        .try_init();

    let result = match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            proto_dir,
        } => {
            let overrides = ServeOverrides {
                host,
                port,
                package: cli.package,
                proto_dir,
            };
            commands::serve::run(config, overrides).await
        }

        Commands::Schema { format, only, out } => match demo::demo_state(cli.package.as_deref()) {
            Ok(state) => commands::schema::run(&state, format, only.as_deref(), out.as_deref()),
            Err(e) => Err(e),
        },

        Commands::Call { method, params } => match demo::demo_state(cli.package.as_deref()) {
            Ok(state) => commands::call::call(&state, &method, &params).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
