//! Protocol errors
//!
//! Every failure a client can trigger maps to one JSON-RPC error code here.

use crate::mcp::protocol::*;
use thiserror::Error;
use tracing::error;

/// Failures reported back to the client as JSON-RPC errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Invalid tool parameters for {tool}: {message}")]
    InvalidToolParameters { tool: String, message: String },

    #[error("Server not initialized")]
    ServerNotInitialized,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },

    #[error("JSON-RPC parse error: {message}")]
    ParseError { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    #[error("Missing session ID")]
    SessionRequired,

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },
}

impl McpError {
    /// Code and message sent on the wire
    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::ToolNotFound { name } => JsonRpcError::new(
                mcp_error_codes::TOOL_NOT_FOUND,
                format!("Tool not found: {}", name),
                None,
            ),
            Self::InvalidToolParameters { tool, message } => JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Invalid parameters for tool '{}': {}", tool, message),
                None,
            ),
            Self::ServerNotInitialized => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                "Server not initialized. Send initialize request first.".to_string(),
                None,
            ),
            Self::InvalidRequest { message } => {
                JsonRpcError::new(error_codes::INVALID_REQUEST, message.clone(), None)
            }
            Self::InternalError { message } => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, message.clone(), None)
            }
            Self::ParseError { message } => {
                JsonRpcError::new(error_codes::PARSE_ERROR, message.clone(), None)
            }
            Self::MethodNotFound { method } => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
                None,
            ),
            Self::InvalidParameters { message } => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, message.clone(), None)
            }
            Self::SessionRequired => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                "Bad Request: Missing session ID".to_string(),
                None,
            ),
            Self::SessionNotFound { .. } => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                "Session not found".to_string(),
                None,
            ),
        }
    }

    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        let error = self.to_jsonrpc_error();
        let error_response = JsonRpcErrorResponse::new(error, id);
        JsonRpcMessage::ErrorResponse(error_response)
    }

    #[inline]
    pub fn log(&self) {
        match self {
            Self::ParseError { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidParameters { .. }
            | Self::InvalidToolParameters { .. }
            | Self::ServerNotInitialized
            | Self::SessionRequired
            | Self::SessionNotFound { .. } => {
                error!("Client error: {}", self);
            }
            Self::ToolNotFound { .. } | Self::MethodNotFound { .. } => {
                error!("Not found error: {}", self);
            }
            Self::InternalError { .. } => {
                error!("Server error: {}", self);
            }
        }
    }
}

/// Turns handler errors into error replies
pub struct ErrorHandler;

impl ErrorHandler {
    /// `McpError` keeps its code, bad params are `-32602`, anything else `-32603`
    #[inline]
    pub fn handle_error(error: &anyhow::Error, id: Option<RequestId>) -> JsonRpcMessage {
        if let Some(mcp_error) = error.downcast_ref::<McpError>() {
            mcp_error.log();
            return mcp_error.to_error_response(id);
        }

        // Parameter payloads that fail to deserialize
        if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
            let invalid = McpError::InvalidParameters {
                message: json_error.to_string(),
            };
            invalid.log();
            return invalid.to_error_response(id);
        }

        error!("Unexpected error: {:#}", error);
        let internal_error = McpError::InternalError {
            message: error.to_string(),
        };
        internal_error.to_error_response(id)
    }
}

pub type McpResult<T> = Result<T, McpError>;

/// Undecodable input is a parse error
impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError {
            message: error.to_string(),
        }
    }
}
