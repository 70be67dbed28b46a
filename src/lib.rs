use thiserror::Error;

pub type Result<T> = std::result::Result<T, McpMacError>;

#[derive(Error, Debug)]
pub enum McpMacError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod mcp;
pub mod node;
