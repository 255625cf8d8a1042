use crate::model::ModelError;
use crate::tools::ToolError;
use thiserror::Error;

/// Why a query failed.
///
/// A failed query never poisons the orchestrator; the next query starts
/// from a fresh transcript.
#[derive(Debug, Error)]
pub enum Error {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("tool host failed: {0}")]
    ToolHost(#[from] ToolError),

    #[error("model requested unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("model requested tool '{name}' after a tool result had been reported")]
    UnexpectedToolCall { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;
