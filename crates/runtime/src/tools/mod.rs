//! Tool host boundary and the MCP-backed implementation.

pub mod errors;
mod host;
mod mcp_host;
mod types;

pub use errors::ToolError;
pub use host::ToolHost;
pub use mcp_host::McpToolHost;
pub use types::{ToolDescriptor, ToolInvocationResult};
