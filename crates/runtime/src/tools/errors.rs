use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that keep a tool call from completing.
///
/// A tool that runs and reports failure is not an error here; see
/// [`ToolInvocationResult::success`](super::ToolInvocationResult).
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    /// The tool host could not be reached (spawn, I/O, exit, timeout).
    #[error("tool host unavailable: {0}")]
    Unavailable(String),
    /// The tool host refused the call (unknown name, invalid arguments).
    #[error("tool host rejected call: {0}")]
    Rejected(String),
}

impl From<mcp::Error> for ToolError {
    fn from(err: mcp::Error) -> Self {
        match err {
            mcp::Error::JsonRpc(rpc) => Self::Rejected(rpc.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_are_rejections() {
        let err = ToolError::from(mcp::Error::JsonRpc(mcp::JsonRpcError::invalid_params(
            "missing city",
        )));
        assert!(matches!(err, ToolError::Rejected(msg) if msg.contains("missing city")));
    }

    #[test]
    fn transport_errors_are_unavailability() {
        let err = ToolError::from(mcp::Error::ServerExited);
        assert!(matches!(err, ToolError::Unavailable(_)));
    }
}
