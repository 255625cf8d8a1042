//! Conversation types and the model backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, FunctionDeclaration, ModelReply, ModelRequest, ModelResponse, ToolCall, ToolResult,
    Transcript, Turn, Usage,
};
