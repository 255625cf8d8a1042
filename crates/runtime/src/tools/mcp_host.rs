//! MCP-backed tool host.

use super::{ToolDescriptor, ToolError, ToolHost, ToolInvocationResult};
use mcp::{CallToolResult, Server, ServerConfig};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Tool host backed by an MCP server child process.
#[derive(Debug)]
pub struct McpToolHost {
    server: Server,
    descriptors: Vec<ToolDescriptor>,
}

impl McpToolHost {
    /// Spawn the MCP server, run the handshake and cache its tool list.
    pub async fn spawn(config: ServerConfig) -> Result<Self, ToolError> {
        let server = Server::spawn(config).await?;
        server.initialize().await?;

        let descriptors: Vec<ToolDescriptor> = server
            .tools()
            .await
            .into_iter()
            .map(ToolDescriptor::from)
            .collect();

        info!(
            server = server.name(),
            tools = descriptors.len(),
            "connected to tool host"
        );

        Ok(Self {
            server,
            descriptors,
        })
    }

    /// Name of the configured server.
    pub fn name(&self) -> &str {
        self.server.name()
    }

    /// Stop the server process.
    pub async fn shutdown(self) -> Result<(), ToolError> {
        self.server.shutdown().await?;
        Ok(())
    }
}

impl ToolHost for McpToolHost {
    fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ToolInvocationResult, ToolError> {
        let result = self
            .server
            .call_tool(name, Some(Value::Object(arguments.clone())))
            .await?;

        debug!(tool = name, is_error = result.is_error, "tool returned");

        Ok(ToolInvocationResult {
            tool_name: name.to_string(),
            arguments: arguments.clone(),
            success: !result.is_error,
            payload: payload(&result),
        })
    }
}

/// Flatten tool output: plain text when every block is text, otherwise the
/// content blocks themselves.
fn payload(result: &CallToolResult) -> Value {
    if result.is_text_only() {
        Value::String(result.joined_text())
    } else {
        serde_json::to_value(&result.content).unwrap_or(Value::Null)
    }
}
