//! Tool-related types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool discovered from the tool host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema-like description of the accepted arguments.
    pub parameter_schema: Value,
}

impl From<mcp::Tool> for ToolDescriptor {
    fn from(tool: mcp::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            parameter_schema: tool.input_schema,
        }
    }
}

/// What a tool host returned for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// Opaque to the orchestrator; forwarded to the model as is.
    pub payload: Value,
    pub success: bool,
}
