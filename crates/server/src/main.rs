use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;
mod sse;

use config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "MCP tool server pushing JSON-RPC responses over server-sent events", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sluice.toml", env = "SLUICE_CONFIG")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=info,sluice_server=info,sluice_mcp=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Sluice MCP server");

    // Load configuration
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(
        "Sessions advertise {} and discover tools at {}",
        config.session.message_path,
        config.session.tool_source
    );

    // Start API server
    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, config).await?;

    Ok(())
}
