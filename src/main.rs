use clap::{Parser, ValueEnum};
use mcp_server_mac::Result;
use mcp_server_mac::commands::serve;
use mcp_server_mac::config::{Config, Transport};

#[derive(Parser)]
#[command(name = "mcp-server-mac")]
#[command(about = "MCP server exposing this machine's MAC address as a tool")]
#[command(version)]
struct Cli {
    /// Bind address for the HTTP transport (overrides HOST)
    #[arg(long)]
    host: Option<String>,
    /// Bind port for the HTTP transport (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Transport to serve on (overrides MCP_TRANSPORT)
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    StreamableHttp,
}

impl From<TransportArg> for Transport {
    #[inline]
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::StreamableHttp => Self::StreamableHttp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the stdio transport, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config = Config::from_env()?.with_overrides(
        cli.host,
        cli.port,
        cli.transport.map(Transport::from),
    );

    serve(&config).await?;

    Ok(())
}
