//! MCP (Model Context Protocol) Server Implementation
//!
//! A JSON-RPC 2.0 server speaking MCP over stdio or streamable HTTP.

#[cfg(test)]
mod tests;

pub mod errors;
pub mod http;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod validation;

pub use errors::{ErrorHandler, McpError, McpResult};
pub use protocol::{
    CallToolParams, CallToolResult, JsonRpcMessage, ListToolsResult, Tool, ToolContent,
};
pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
