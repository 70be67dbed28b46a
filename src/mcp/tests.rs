//! Tool and dispatch tests

#[cfg(test)]
mod get_mac_address_tool_tests {
    use crate::mcp::protocol::{CallToolParams, ToolContent};
    use crate::mcp::server::ToolHandler;
    use crate::mcp::tools::GetMacAddressHandler;
    use crate::node::NodeId;

    #[test]
    fn get_mac_address_tool_definition() {
        let tool = GetMacAddressHandler::tool_definition();

        assert_eq!(tool.name, "get_mac_address");
        assert_eq!(
            tool.description,
            Some("Return the MAC address of the current machine.".to_string())
        );

        // Should have no parameters
        let schema = tool.input_schema;
        assert_eq!(schema["type"], "object");
        let properties = schema["properties"].as_object().expect("has properties");
        assert!(properties.is_empty());
        assert!(schema.get("required").is_none());
    }

    #[tokio::test]
    async fn reports_injected_address() {
        let id = NodeId::try_from(0x0a1b_2c3d_4e5f_u64).expect("fits in 48 bits");
        let handler = GetMacAddressHandler::with_node_id(id);

        let result = handler
            .handle(CallToolParams {
                name: GetMacAddressHandler::NAME.to_string(),
                arguments: None,
            })
            .await
            .expect("tool never fails");

        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
        let ToolContent::Text { text } = &result.content[0];
        assert_eq!(text, "0a:1b:2c:3d:4e:5f");
        assert_eq!(
            result.structured_content,
            Some(serde_json::json!({"result": "0a:1b:2c:3d:4e:5f"}))
        );
    }

    #[test]
    fn default_handler_reports_this_machine() {
        let handler = GetMacAddressHandler::new();
        assert_eq!(handler.mac_address(), crate::node::node_id().to_string());
    }
}

#[cfg(test)]
mod message_handler_tests {
    use crate::mcp::protocol::*;
    use crate::mcp::server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
    use crate::mcp::tools::GetMacAddressHandler;
    use crate::node::NodeId;
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn server() -> Arc<McpServer> {
        let server = McpServer::new("test-server".to_string(), "1.0.0".to_string())
            .expect("Failed to create MCP server");
        let id = NodeId::try_from(0x0022_4d00_0001_u64).expect("fits in 48 bits");
        server
            .register_tool(
                GetMacAddressHandler::tool_definition(),
                GetMacAddressHandler::with_node_id(id),
            )
            .await
            .expect("Failed to register tool");
        Arc::new(server)
    }

    fn initialize_line(version: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.0.1"}
            }
        })
        .to_string()
    }

    fn result_of(message: Option<JsonRpcMessage>) -> Value {
        match message {
            Some(JsonRpcMessage::Response(response)) => response.result,
            other => panic!("Expected success response, got {other:?}"),
        }
    }

    fn error_code_of(message: Option<JsonRpcMessage>) -> i32 {
        match message {
            Some(JsonRpcMessage::ErrorResponse(response)) => response.error.code,
            other => panic!("Expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_negotiates_version() {
        let handler = MessageHandler::new(server().await);

        let result = result_of(handler.handle_raw(&initialize_line("2024-11-05")).await);
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "test-server");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);

        let result = result_of(handler.handle_raw(&initialize_line("1999-01-01")).await);
        assert_eq!(result["protocolVersion"], MCP_VERSION);
    }

    #[tokio::test]
    async fn lifecycle_state_transitions() {
        let server = server().await;
        let handler = MessageHandler::new(Arc::clone(&server));
        assert_eq!(server.connection_state().await, ConnectionState::Uninitialized);

        handler.handle_raw(&initialize_line(MCP_VERSION)).await;
        assert_eq!(server.connection_state().await, ConnectionState::Initializing);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
        assert_eq!(server.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn tools_rejected_before_initialize() {
        let handler = MessageHandler::new(server().await);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await;
        assert_eq!(error_code_of(reply), error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn ping_allowed_before_initialize() {
        let handler = MessageHandler::new(server().await);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
            .await;
        assert_eq!(result_of(reply), json!({}));
    }

    #[tokio::test]
    async fn call_tool_returns_mac() {
        let handler = MessageHandler::new(server().await);
        handler.handle_raw(&initialize_line(MCP_VERSION)).await;

        let reply = handler
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_mac_address","arguments":{}}}"#,
            )
            .await;
        let result = result_of(reply);
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "00:22:4d:00:00:01");
    }

    #[tokio::test]
    async fn call_tool_without_arguments() {
        let handler = MessageHandler::new(server().await);
        handler.handle_raw(&initialize_line(MCP_VERSION)).await;

        let reply = handler
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"get_mac_address"}}"#,
            )
            .await;
        assert_eq!(result_of(reply)["content"][0]["text"], "00:22:4d:00:00:01");
    }

    #[tokio::test]
    async fn unknown_tool_and_method() {
        let handler = MessageHandler::new(server().await);
        handler.handle_raw(&initialize_line(MCP_VERSION)).await;

        let reply = handler
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#,
            )
            .await;
        assert_eq!(error_code_of(reply), mcp_error_codes::TOOL_NOT_FOUND);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":6,"method":"resources/list"}"#)
            .await;
        assert_eq!(error_code_of(reply), error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_input() {
        let handler = MessageHandler::new(server().await);

        assert_eq!(
            error_code_of(handler.handle_raw("{not json").await),
            error_codes::PARSE_ERROR
        );

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
            .await;
        match reply {
            Some(JsonRpcMessage::ErrorResponse(response)) => {
                assert_eq!(response.error.code, error_codes::INVALID_REQUEST);
                assert_eq!(response.id, Some(RequestId::Number(7)));
            }
            other => panic!("Expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_without_params_is_invalid() {
        let handler = MessageHandler::new(server().await);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":8,"method":"initialize"}"#)
            .await;
        assert_eq!(error_code_of(reply), error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn client_responses_are_ignored() {
        let handler = MessageHandler::new(server().await);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn bad_method_params_are_invalid_params() {
        let handler = MessageHandler::new(server().await);

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":10,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}"#)
            .await;
        assert_eq!(error_code_of(reply), error_codes::INVALID_PARAMS);

        handler.handle_raw(&initialize_line(MCP_VERSION)).await;
        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":11,"method":"tools/call","params":{"arguments":{}}}"#)
            .await;
        match reply {
            Some(JsonRpcMessage::ErrorResponse(response)) => {
                assert_eq!(response.error.code, error_codes::INVALID_PARAMS);
                assert_eq!(response.id, Some(RequestId::Number(11)));
            }
            other => panic!("Expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_with_unusable_ids_are_rejected() {
        let handler = MessageHandler::new(server().await);

        for raw in [
            r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#,
        ] {
            match handler.handle_raw(raw).await {
                Some(JsonRpcMessage::ErrorResponse(response)) => {
                    assert_eq!(response.error.code, error_codes::INVALID_REQUEST, "{raw}");
                    assert_eq!(response.id, None, "{raw}");
                }
                other => panic!("Expected error response for {raw}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn lines_that_are_not_utf8_are_parse_errors() {
        let handler = MessageHandler::new(server().await);

        assert_eq!(
            error_code_of(handler.handle_line(b"\xff\xfe").await),
            error_codes::PARSE_ERROR
        );
        assert!(handler.handle_line(b"  \r").await.is_none());
        assert_eq!(
            result_of(
                handler
                    .handle_line(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
                    .await
            ),
            json!({})
        );
    }

    struct FailingHandler;

    #[async_trait::async_trait]
    impl ToolHandler for FailingHandler {
        async fn handle(&self, _params: CallToolParams) -> anyhow::Result<CallToolResult> {
            Err(anyhow::anyhow!("interface table unreadable"))
        }
    }

    #[tokio::test]
    async fn handler_failure_is_internal_error() {
        let server = server().await;
        server
            .register_tool(
                Tool {
                    name: "broken".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                FailingHandler,
            )
            .await
            .expect("Failed to register tool");

        let handler = MessageHandler::new(server);
        handler.handle_raw(&initialize_line(MCP_VERSION)).await;

        let reply = handler
            .handle_raw(r#"{"jsonrpc":"2.0","id":12,"method":"tools/call","params":{"name":"broken"}}"#)
            .await;
        match reply {
            Some(JsonRpcMessage::ErrorResponse(response)) => {
                assert_eq!(response.error.code, error_codes::INTERNAL_ERROR);
                assert!(response.error.message.contains("interface table unreadable"));
                assert_eq!(response.id, Some(RequestId::Number(12)));
            }
            other => panic!("Expected error response, got {other:?}"),
        }
    }
}
