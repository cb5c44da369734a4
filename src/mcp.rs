//! MCP JSON-RPC protocol bridge.
//!
//! Adapts the [`ToolRegistry`] into a proper MCP Streamable HTTP endpoint
//! that Cursor and other MCP clients can connect to using the standard
//! JSON-RPC protocol. Tools are exposed via `list_tools` / `call_tool`;
//! tagged tool failures map to `isError` tool results, never to protocol
//! errors.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::config::Config;
use crate::gateway::Gateway;
use crate::notify::Notifier;
use crate::tools::{Tool as HarnessTool, ToolContext, ToolRegistry};

/// Bridges the tool registry to the MCP JSON-RPC protocol.
///
/// Each MCP session receives a clone of this struct (everything is behind
/// `Arc`), so all sessions share the same gateway and tool set.
#[derive(Clone)]
pub struct McpBridge {
    config: Arc<Config>,
    gateway: Arc<Gateway>,
    notifier: Arc<dyn Notifier>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<Gateway>,
        notifier: Arc<dyn Notifier>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config,
            gateway,
            notifier,
            tools,
        }
    }

    /// Convert a registry tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn HarnessTool) -> Tool {
        let schema_value = tool.parameters_schema();
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema_value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "workitem-harness".to_string(),
                title: Some("Work Item Harness".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Work Item Harness — query tools over an Azure DevOps work item tracker. \
                 Use search_work_items for relevance-ranked text search, filter_work_items \
                 for natural-language date/status filters, get_work_item to fetch one record \
                 with its discussion, and list_work_items for a plain listing by type."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let ctx = ToolContext::new(
            self.config.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
        );
        let result = tool.execute(params, &ctx).await;
        if result.is_error {
            return Ok(CallToolResult::error(vec![Content::text(result.text)]));
        }

        let mut content = vec![Content::text(result.text)];
        if let Some(json) = &result.json {
            let pretty = serde_json::to_string_pretty(json).unwrap_or_default();
            content.push(Content::text(pretty));
        }
        Ok(CallToolResult::success(content))
    }
}
