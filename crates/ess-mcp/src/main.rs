//! ESS MCP Server.
//!
//! Exposes code intelligence tools to AI coding agents via the
//! Model Context Protocol (MCP). Supports stdio and SSE transports; every
//! tool call is resolved against a project registered in
//! `~/.veracity/projects.yaml` (see [`ess_core::watcher::ProjectRegistry`]).

mod tools;

use anyhow::Result;
use clap::Parser;
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

use tools::ESSServer;

/// ESS MCP Server
#[derive(Parser, Debug)]
#[command(name = "ess-mcp", version, about)]
struct Args {
    /// Transport protocol to use.
    #[arg(long, default_value = "stdio", value_parser = ["stdio", "sse"])]
    transport: String,

    /// Bind address for SSE transport (ignored for stdio).
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port for SSE transport (ignored for stdio).
    #[arg(long, default_value_t = 3179)]
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

    tracing::info!(transport = %args.transport, "ESS MCP server starting");

    match args.transport.as_str() {
        "stdio" => run_stdio().await,
        "sse" => run_sse(&args.bind, args.port).await,
        other => anyhow::bail!("unknown transport '{other}'"),
    }
}

async fn run_stdio() -> Result<()> {
    let server = ESSServer::new();
    let service = server.serve(stdio()).await?;
    tracing::info!("MCP server ready (stdio)");
    service.waiting().await?;
    Ok(())
}

async fn run_sse(bind: &str, port: u16) -> Result<()> {
    let addr: std::net::SocketAddr = format!("{bind}:{port}").parse()?;
    let ct = SseServer::serve(addr).await?.with_service(ESSServer::new);
    tracing::info!(%addr, "MCP server ready (sse)");
    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}
