//! Tool host trait.

use super::{ToolDescriptor, ToolError, ToolInvocationResult};
use serde_json::{Map, Value};
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations discover their tools once, up front, and execute calls
/// one at a time. This is the boundary between the model loop and side
/// effects.
pub trait ToolHost: Send + Sync {
    /// Tools discovered when the host was started.
    fn descriptors(&self) -> &[ToolDescriptor];

    /// Invoke a tool by name.
    fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> impl Future<Output = Result<ToolInvocationResult, ToolError>> + Send;
}
