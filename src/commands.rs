use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, Transport};
use crate::mcp::McpServer;
use crate::mcp::http::serve_http;
use crate::mcp::tools::GetMacAddressHandler;

/// Name advertised in `serverInfo`
pub const SERVER_NAME: &str = "mcp-server-mac";

/// Construct the MCP server with every tool registered
#[inline]
pub async fn build_server() -> Result<McpServer> {
    let server = McpServer::new(SERVER_NAME.to_string(), env!("CARGO_PKG_VERSION").to_string())
        .context("Failed to create MCP server")?
        .with_instructions("Call get_mac_address to read this machine's network hardware address.");

    server
        .register_tool(
            GetMacAddressHandler::tool_definition(),
            GetMacAddressHandler::new(),
        )
        .await
        .context("Failed to register get_mac_address tool")?;

    Ok(server)
}

/// Run the server over the configured transport until the process is told to stop
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let server = Arc::new(build_server().await?);

    match config.transport {
        Transport::StreamableHttp => {
            info!("Serving over {} at {}", config.transport, config.bind_address());
            serve_http(server, &config.host, config.port).await
        }
        Transport::Stdio => {
            info!("Serving over {}", config.transport);
            server.serve_stdio().await
        }
    }
}
