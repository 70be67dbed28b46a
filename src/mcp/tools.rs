//! The `get_mac_address` tool

use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::node::{self, NodeId};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Returns the machine's hardware address as `aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone, Copy, Default)]
pub struct GetMacAddressHandler {
    fixed: Option<NodeId>,
}

impl GetMacAddressHandler {
    pub const NAME: &'static str = "get_mac_address";

    /// Handler reporting the address of this machine
    #[inline]
    pub fn new() -> Self {
        Self { fixed: None }
    }

    /// Handler that always reports `id`
    #[inline]
    pub fn with_node_id(id: NodeId) -> Self {
        Self { fixed: Some(id) }
    }

    /// Create the get_mac_address tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Return the MAC address of the current machine.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    #[inline]
    pub fn mac_address(&self) -> String {
        self.fixed.unwrap_or_else(node::node_id).to_string()
    }
}

#[async_trait]
impl ToolHandler for GetMacAddressHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        let mac = self.mac_address();
        debug!("Reporting MAC address {}", mac);
        Ok(CallToolResult::text(mac))
    }
}
