//! Message and argument validation
//!
//! Incoming values are checked against Draft 7 schemas before dispatch. A
//! broken envelope is reported as `-32600`, bad method params as `-32602`.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

/// Compiled schemas for the JSON-RPC envelopes and the params of known methods
#[derive(Debug)]
pub struct McpValidator {
    schemas: HashMap<String, JSONSchema>,
}

impl McpValidator {
    #[inline]
    pub fn new() -> Result<Self> {
        let mut validator = Self {
            schemas: HashMap::new(),
        };

        validator.load_builtin_schemas()?;

        Ok(validator)
    }

    fn load_builtin_schemas(&mut self) -> Result<()> {
        let version = json!({"type": "string", "const": JSONRPC_VERSION});
        let id = json!({"type": ["string", "integer"]});

        self.add_schema(
            "jsonrpc_request",
            &json!({
                "type": "object",
                "properties": {"jsonrpc": version, "method": {"type": "string"}, "id": id},
                "required": ["jsonrpc", "method", "id"]
            }),
        )?;

        self.add_schema(
            "jsonrpc_response",
            &json!({
                "type": "object",
                "properties": {"jsonrpc": version, "id": id},
                "required": ["jsonrpc", "result", "id"]
            }),
        )?;

        self.add_schema(
            "jsonrpc_error_response",
            &json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "error": {
                        "type": "object",
                        "properties": {
                            "code": {"type": "integer"},
                            "message": {"type": "string"}
                        },
                        "required": ["code", "message"]
                    },
                    "id": {"type": ["string", "integer", "null"]}
                },
                "required": ["jsonrpc", "error", "id"]
            }),
        )?;

        self.add_schema(
            "jsonrpc_notification",
            &json!({
                "type": "object",
                "properties": {"jsonrpc": version, "method": {"type": "string"}},
                "required": ["jsonrpc", "method"]
            }),
        )?;

        // Clients routinely send extra capability keys (roots, elicitation, ...)
        self.add_schema(
            "initialize_params",
            &json!({
                "type": "object",
                "properties": {
                    "protocolVersion": {"type": "string"},
                    "capabilities": {"type": "object"},
                    "clientInfo": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "version": {"type": "string"}
                        },
                        "required": ["name", "version"]
                    }
                },
                "required": ["protocolVersion", "capabilities", "clientInfo"]
            }),
        )?;

        self.add_schema(
            "call_tool_params",
            &json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "arguments": {"type": ["object", "null"]}
                },
                "required": ["name"]
            }),
        )?;

        debug!("Loaded {} built-in JSON schemas", self.schemas.len());
        Ok(())
    }

    /// Compile a Draft 7 schema
    #[inline]
    pub fn compile(name: &str, schema: &Value) -> Result<JSONSchema> {
        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| anyhow!("Failed to compile schema '{}': {}", name, e))
    }

    #[inline]
    pub fn add_schema(&mut self, name: &str, schema: &Value) -> Result<()> {
        let compiled = Self::compile(name, schema)?;
        self.schemas.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Check the request envelope, then the params of methods that have a schema
    #[inline]
    pub fn validate_request(&self, request: &JsonRpcRequest) -> McpResult<()> {
        let request_value = encode(request)?;
        self.validate_envelope("jsonrpc_request", &request_value)?;

        if let Some(params) = &request.params {
            self.validate_method_params(&request.method, params)?;
        }

        Ok(())
    }

    #[inline]
    pub fn validate_response(&self, response: &JsonRpcResponse) -> McpResult<()> {
        self.validate_envelope("jsonrpc_response", &encode(response)?)
    }

    #[inline]
    pub fn validate_error_response(&self, error_response: &JsonRpcErrorResponse) -> McpResult<()> {
        self.validate_envelope("jsonrpc_error_response", &encode(error_response)?)
    }

    #[inline]
    pub fn validate_notification(&self, notification: &JsonRpcNotification) -> McpResult<()> {
        self.validate_envelope("jsonrpc_notification", &encode(notification)?)
    }

    fn validate_envelope(&self, schema_name: &str, value: &Value) -> McpResult<()> {
        self.validate_with_schema(schema_name, value)
            .map_err(|e| McpError::InvalidRequest {
                message: format!("Invalid Request: {}", e),
            })
    }

    fn validate_method_params(&self, method: &str, params: &Value) -> McpResult<()> {
        let schema_name = match method {
            "initialize" => "initialize_params",
            "tools/call" => "call_tool_params",
            _ => {
                debug!("No parameter validation schema for method: {}", method);
                return Ok(());
            }
        };

        self.validate_with_schema(schema_name, params)
            .map_err(|e| McpError::InvalidParameters {
                message: format!("Invalid params for {}: {}", method, e),
            })
    }

    /// Validate a value against a named schema
    #[inline]
    pub fn validate_with_schema(&self, schema_name: &str, value: &Value) -> Result<()> {
        let schema = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| anyhow!("Schema '{}' not found", schema_name))?;

        check(schema, value).map_err(|message| {
            anyhow!("Schema validation failed for '{}': {}", schema_name, message)
        })
    }

    /// Classify and validate a decoded value as one JSON-RPC message.
    ///
    /// A value carrying an `id` is never taken for a notification, so a
    /// request with an unusable id is rejected instead of silently dropped.
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> McpResult<JsonRpcMessage> {
        if let Ok(request) = serde_json::from_value::<JsonRpcRequest>(value.clone()) {
            self.validate_request(&request)?;
            return Ok(JsonRpcMessage::Request(request));
        }

        if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value.clone()) {
            self.validate_response(&response)?;
            return Ok(JsonRpcMessage::Response(response));
        }

        if let Ok(error_response) = serde_json::from_value::<JsonRpcErrorResponse>(value.clone()) {
            self.validate_error_response(&error_response)?;
            return Ok(JsonRpcMessage::ErrorResponse(error_response));
        }

        if value.get("id").is_none() {
            if let Ok(notification) = serde_json::from_value::<JsonRpcNotification>(value.clone()) {
                self.validate_notification(&notification)?;
                return Ok(JsonRpcMessage::Notification(notification));
            }
        }

        Err(McpError::InvalidRequest {
            message: "Invalid Request: not a JSON-RPC 2.0 message".to_string(),
        })
    }

    /// Pick the protocol version to answer an `initialize` with.
    ///
    /// A supported version is echoed back; anything else gets the latest.
    #[inline]
    pub fn negotiate_protocol_version(&self, requested: &str) -> &'static str {
        SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .copied()
            .find(|v| *v == requested)
            .unwrap_or(MCP_VERSION)
    }
}

/// Validate tool call arguments against the tool's compiled input schema
#[inline]
pub fn validate_tool_arguments(tool: &str, schema: &JSONSchema, arguments: &Value) -> McpResult<()> {
    check(schema, arguments).map_err(|message| McpError::InvalidToolParameters {
        tool: tool.to_string(),
        message,
    })
}

fn encode<T: serde::Serialize>(message: &T) -> McpResult<Value> {
    serde_json::to_value(message).map_err(|e| McpError::InternalError {
        message: format!("Failed to encode message for validation: {}", e),
    })
}

fn check(schema: &JSONSchema, value: &Value) -> std::result::Result<(), String> {
    if let Err(errors) = schema.validate(value) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{}:{}", e.instance_path, e))
            .collect();
        return Err(error_messages.join(", "));
    }
    Ok(())
}
