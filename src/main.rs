//! Demo MCP Servers Entry Point
//!
//! Parses command-line flags (each with an environment variable fallback),
//! registers the selected demo tool table, and starts the requested transport.
//!
//! | Flag               | Variable             | Default           |
//! |--------------------|----------------------|-------------------|
//! | `--server`         | `MCP_SERVER`         | `all`             |
//! | `--transport`      | `MCP_TRANSPORT_MODE` | `stdio`           |
//! | `--name`           | `SERVER_NAME`        | per server        |
//! | `--server-version` | `SERVER_VERSION`     | crate version     |
//! | `--host`           | `HOST`               | `0.0.0.0`         |
//! | `--port`           | `PORT`               | `3000`            |
//! | `--workers`        | `WORKER_THREADS`     | CPU count, max 16 |
//! | `--config`         | `MCP_CONFIG`         | `kmcp.yaml`       |
//! | `--log-json`       | `LOG_JSON`           | off               |
//!
//! Logs are written to stderr (filter with `RUST_LOG`) so stdout carries
//! only JSON-RPC traffic in STDIO mode.

mod core;
mod tools;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::core::notify::Notifier;
use crate::core::registry::ToolRegistry;
use crate::core::server::{self, AppState, McpService};
use crate::core::utils::load_config;
use crate::tools::ServerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// JSON-RPC over HTTP POST with an SSE notification stream
    Http,
    /// STDIO and HTTP concurrently
    Both,
}

#[derive(Debug, Parser)]
#[command(version, about = "Demo MCP tool servers")]
struct Cli {
    /// Tool table to serve
    #[arg(long, env = "MCP_SERVER", value_enum, default_value_t = ServerKind::All)]
    server: ServerKind,

    #[arg(long, env = "MCP_TRANSPORT_MODE", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Server name reported to clients
    #[arg(long, env = "SERVER_NAME")]
    name: Option<String>,

    #[arg(long = "server-version", env = "SERVER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    server_version: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// HTTP worker threads
    #[arg(long, env = "WORKER_THREADS")]
    workers: Option<usize>,

    /// YAML file with per-tool settings
    #[arg(long, env = "MCP_CONFIG", default_value = "kmcp.yaml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let state = AppState {
        server_name: cli
            .name
            .clone()
            .unwrap_or_else(|| cli.server.default_name().to_string()),
        server_version: cli.server_version.clone(),
    };

    let registry = Arc::new(ToolRegistry::new());
    let resources = tools::register_all(cli.server, &registry, &config, &state);
    let service = McpService::new(state, registry, resources, Notifier::new());

    match cli.transport {
        Transport::Stdio => server::run_server_stdio(service).await?,
        Transport::Http => server::run_server_http(service, cli.host, cli.port, cli.workers).await?,
        Transport::Both => {
            // STDIO runs in the background; the HTTP server owns the process
            let stdio_service = service.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_service).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });

            let http_result = server::run_server_http(service, cli.host, cli.port, cli.workers).await;
            stdio_handle.abort();
            http_result?;
        }
    }
    Ok(())
}
