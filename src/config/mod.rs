//! Process configuration
//!
//! Everything is sourced from the environment once at startup. Command-line
//! flags may override individual values afterwards.

use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

#[cfg(test)]
mod tests;

pub const HOST_VAR: &str = "HOST";
pub const PORT_VAR: &str = "PORT";
pub const TRANSPORT_VAR: &str = "MCP_TRANSPORT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

/// Channel the server speaks MCP over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST with session ids
    StreamableHttp,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port: {value:?} ({source})")]
    InvalidPort {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: Transport::Stdio,
        }
    }
}

impl Config {
    /// Read `HOST`, `PORT` and `MCP_TRANSPORT` from the process environment
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_VAR).unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup(PORT_VAR) {
            Some(value) => parse_port(&value)?,
            None => DEFAULT_PORT,
        };

        let transport = lookup(TRANSPORT_VAR)
            .map(|name| Transport::from_name(&name))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            transport,
        })
    }

    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Replace values for which an override was given
    #[inline]
    #[must_use]
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        transport: Option<Transport>,
    ) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(transport) = transport {
            self.transport = transport;
        }
        self
    }
}

impl Transport {
    pub const STREAMABLE_HTTP: &'static str = "streamable-http";
    pub const STDIO: &'static str = "stdio";

    /// Only an exact `streamable-http` selects HTTP; everything else is stdio.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        if name == Self::STREAMABLE_HTTP {
            Self::StreamableHttp
        } else {
            Self::Stdio
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => Self::STDIO,
            Self::StreamableHttp => Self::STREAMABLE_HTTP,
        }
    }
}

impl fmt::Display for Transport {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a port value, tolerating surrounding whitespace
#[inline]
pub fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|source| ConfigError::InvalidPort {
            value: value.to_string(),
            source,
        })
}
