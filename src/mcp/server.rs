//! Tool registry, message routing and the stdio loop
//!
//! [`MessageHandler`] turns one decoded message into at most one reply. The
//! stdio loop here and the HTTP transport in [`crate::mcp::http`] both drive it.

use crate::mcp::errors::{ErrorHandler, McpError};
use crate::mcp::protocol::*;
use crate::mcp::validation::{McpValidator, validate_tool_arguments};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Usage hint sent to clients on initialize
    pub instructions: Option<String>,
    /// Registered tools, keyed by name
    pub tools: Arc<RwLock<HashMap<String, RegisteredTool>>>,
    /// Connection state of the stdio session
    pub connection_state: Arc<RwLock<ConnectionState>>,
    /// Message validator
    pub validator: Arc<McpValidator>,
    started_at: DateTime<Utc>,
}

/// A tool definition together with its handler and compiled argument schema
pub struct RegisteredTool {
    pub tool: Tool,
    handler: Box<dyn ToolHandler>,
    arguments_schema: JSONSchema,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Routes decoded messages for one connection or session
pub struct MessageHandler {
    server: Arc<McpServer>,
    state: Arc<RwLock<ConnectionState>>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Result<Self> {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            experimental: None,
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let validator = McpValidator::new()?;

        Ok(Self {
            server_info,
            capabilities,
            instructions: None,
            tools: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            validator: Arc::new(validator),
            started_at: Utc::now(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H) -> Result<()>
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();
        let arguments_schema = McpValidator::compile(&tool_name, &tool.input_schema)
            .with_context(|| format!("Invalid input schema for tool '{}'", tool_name))?;

        let registered = RegisteredTool {
            tool,
            handler: Box::new(handler),
            arguments_schema,
        };

        {
            let mut tools = self.tools.write().await;
            if tools.insert(tool_name.clone(), registered).is_some() {
                warn!("Replaced existing tool: {}", tool_name);
            }
        }

        debug!("Registered tool: {}", tool_name);
        Ok(())
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(io::stdin(), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC until the reader hits EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let handler = MessageHandler::new(Arc::clone(&self));

        let mut line = Vec::new();
        let outcome = loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break Ok(());
                }
                Ok(_) => {
                    let Some(reply) = handler.handle_line(&line).await else {
                        continue;
                    };

                    if let Err(e) = self.send_message(&mut writer, &reply).await {
                        break Err(e.context("Failed to write to stdout"));
                    }
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break Err(anyhow::Error::new(e).context("Failed to read from stdin"));
                }
            }
        };

        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Closed;
        }

        info!("MCP server stopped");
        outcome
    }

    /// Send a message to the client
    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    #[inline]
    pub fn uptime(&self) -> std::time::Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    #[inline]
    pub async fn health_status(&self) -> ServerHealthStatus {
        ServerHealthStatus {
            connection_state: self.connection_state().await,
            tools_registered: self.tools.read().await.len(),
            uptime: self.uptime(),
        }
    }
}

impl MessageHandler {
    /// Handler bound to the server's own (stdio) connection state
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        let state = Arc::clone(&server.connection_state);
        Self { server, state }
    }

    /// Handler bound to a separate connection state, one per HTTP session
    #[inline]
    pub fn with_state(server: Arc<McpServer>, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self { server, state }
    }

    /// Process one line read from a byte stream.
    ///
    /// Blank lines produce nothing. Bytes that are not UTF-8 get a parse error.
    #[inline]
    pub async fn handle_line(&self, line: &[u8]) -> Option<JsonRpcMessage> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                let error = McpError::ParseError {
                    message: format!("Message is not valid UTF-8: {}", e),
                };
                error.log();
                return Some(error.to_error_response(None));
            }
        };

        if line.is_empty() {
            return None;
        }

        self.handle_raw(line).await
    }

    /// Decode, validate and process one raw message.
    ///
    /// Returns the reply to send, if any. Notifications and client responses
    /// produce no reply.
    #[inline]
    pub async fn handle_raw(&self, raw: &str) -> Option<JsonRpcMessage> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                let error = McpError::from(e);
                error.log();
                return Some(error.to_error_response(None));
            }
        };

        self.handle_value(&value).await
    }

    /// Validate and process an already-parsed JSON value
    #[inline]
    pub async fn handle_value(&self, value: &Value) -> Option<JsonRpcMessage> {
        match self.server.validator.validate_raw_message(value) {
            Ok(message) => self.process_message(message).await,
            Err(error) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                error.log();
                Some(error.to_error_response(id))
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => self.handle_ping(),
            "tools/list" => match self.require_initialized().await {
                Ok(()) => self.handle_list_tools().await,
                Err(e) => Err(e),
            },
            "tools/call" => match self.require_initialized().await {
                Ok(()) => self.handle_call_tool(request.params).await,
                Err(e) => Err(e),
            },
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => self.handle_initialized().await,
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    async fn require_initialized(&self) -> Result<()> {
        match *self.state.read().await {
            ConnectionState::Initializing | ConnectionState::Ready => Ok(()),
            ConnectionState::Uninitialized | ConnectionState::Closed => {
                Err(McpError::ServerNotInitialized.into())
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                }
                .into());
            }
        };

        let protocol_version = self
            .server
            .validator
            .negotiate_protocol_version(&params.protocol_version);
        if protocol_version != params.protocol_version {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, protocol_version
            );
        }

        {
            let mut state = self.state.write().await;
            *state = ConnectionState::Initializing;
        }

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle initialized notification
    async fn handle_initialized(&self) {
        {
            let mut state = self.state.write().await;
            *state = ConnectionState::Ready;
        }

        info!("Server ready to handle requests");
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.server.tools.read().await;
        let mut tools_vec: Vec<Tool> = tools.values().map(|t| t.tool.clone()).collect();
        tools_vec.sort_by(|a, b| a.name.cmp(&b.name));

        let result = ListToolsResult { tools: tools_vec };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                }
                .into());
            }
        };

        let tools = self.server.tools.read().await;
        let registered = tools.get(&params.name).ok_or_else(|| McpError::ToolNotFound {
            name: params.name.clone(),
        })?;

        let arguments = serde_json::to_value(params.arguments.clone().unwrap_or_default())?;
        validate_tool_arguments(&params.name, &registered.arguments_schema, &arguments)?;

        let tool_name = params.name.clone();
        let result = registered
            .handler
            .handle(params)
            .await
            .inspect_err(|e| error!("Tool '{}' failed: {:#}", tool_name, e))?;

        serde_json::to_value(result).map_err(|e| anyhow!("Failed to encode tool result: {}", e))
    }

    /// Handle ping request
    #[inline]
    pub fn handle_ping(&self) -> Result<Value> {
        Ok(serde_json::json!({}))
    }
}
