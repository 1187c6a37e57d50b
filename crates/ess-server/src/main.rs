//! ESS HTTP server entry point. See [`ess_server`] for the router and
//! handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ess_core::Config;
use ess_server::AppState;

/// ESS HTTP server
#[derive(Parser, Debug)]
#[command(name = "ess-server", version, about = "HTTP adapter for ESS")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8420)]
    port: u16,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    let api_config = ess_core::config::ApiConfig {
        token: std::env::var("VERACITY_API_TOKEN").ok(),
        rate_limit_per_minute: None,
    };

    let state = Arc::new(AppState::new(Config::registry_path(), &api_config));
    let app = ess_server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    tracing::info!(%addr, "ESS HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
