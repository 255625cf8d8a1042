//! Tether runtime: connects a function-calling model to a tool host.
//!
//! # Overview
//!
//! - **Backend**: a trait abstracting the model endpoint ([`GeminiBackend`]).
//! - **ToolHost**: a trait abstracting tool discovery and execution
//!   ([`McpToolHost`] drives an MCP server over stdio).
//! - **schema**: translates tool input schemas into the declarations the
//!   model accepts.
//! - **Orchestrator**: runs one query through at most one tool call and
//!   returns the model's final answer.
//!
//! # Example
//!
//! ```no_run
//! use mcp::ServerConfig;
//! use runtime::{GeminiBackend, McpToolHost, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = GeminiBackend::builder("AIza...", "gemini-1.5-flash").build();
//! let host = McpToolHost::spawn(ServerConfig {
//!     name: "toolbox".into(),
//!     command: "tether-toolbox".into(),
//!     args: Vec::new(),
//!     env: Default::default(),
//!     timeout: None,
//! })
//! .await?;
//!
//! let orchestrator = Orchestrator::new(backend, host);
//! let answer = orchestrator.process_query("What's the weather like in London?").await?;
//! println!("{}", answer.text);
//!
//! let (_, host) = orchestrator.into_parts();
//! host.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod orchestrator;
pub mod providers;
pub mod schema;
pub mod tools;

pub use error::{Error, Result};
pub use model::{
    Backend, FunctionDeclaration, ModelError, ModelReply, ModelRequest, ModelResponse, ToolCall,
    ToolResult, Transcript, Turn, Usage,
};
pub use orchestrator::{Answer, Orchestrator};
pub use providers::{ApiKey, GeminiBackend, GeminiBackendBuilder};
pub use schema::SchemaError;
pub use tools::{McpToolHost, ToolDescriptor, ToolError, ToolHost, ToolInvocationResult};
