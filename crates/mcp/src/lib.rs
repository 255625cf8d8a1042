//! MCP (Model Context Protocol) client library.
//!
//! This crate provides the JSON-RPC message types shared by MCP clients and
//! servers, and a client for communicating with MCP servers via stdio.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     name: "toolbox".to_string(),
//!     command: "tether-toolbox".to_string(),
//!     args: Vec::new(),
//!     env: HashMap::new(),
//!     timeout: None,
//! };
//!
//! let server = Server::spawn(config).await?;
//! server.initialize().await?;
//!
//! let tools = server.tools().await;
//! for tool in tools {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server.call_tool("get_weather", Some(serde_json::json!({
//!     "city": "London"
//! }))).await?;
//! println!("{}", result.joined_text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult, PROTOCOL_VERSION,
    RequestId, ResourceContents, ServerCapabilities, Tool, ToolContent, ToolsCapability,
};
pub use server::{MAX_OUTPUT_SIZE, Server, ServerConfig};
