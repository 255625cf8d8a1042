//! CLI error types.

use crate::config::ConfigError;
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or the API key is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tool server could not be started or stopped.
    #[error(transparent)]
    ToolHost(#[from] runtime::ToolError),

    /// A query failed.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
