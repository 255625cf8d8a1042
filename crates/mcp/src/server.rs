//! MCP server management (spawn, communicate, lifecycle).

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, RequestId, Tool,
};

/// Grace period for a server to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Per-request deadline. `None` waits for as long as the server takes.
    pub timeout: Option<Duration>,
}

/// Server stdout plus any partial line left by a cancelled read.
struct Inbox {
    reader: BufReader<ChildStdout>,
    pending: Vec<u8>,
}

/// Handle to a running MCP server.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<Inbox>,
    next_id: AtomicI64,
    initialized: Mutex<bool>,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        debug!(server = %config.name, command = %config.command, "spawned MCP server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(Inbox {
                reader: BufReader::new(stdout),
                pending: Vec::new(),
            }),
            next_id: AtomicI64::new(1),
            initialized: Mutex::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Initialize the server (must be called before other operations).
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP handshake complete"
        );

        self.notify("notifications/initialized").await?;

        *self.server_info.lock().await = Some(result);
        *self.initialized.lock().await = true;

        self.refresh_tools().await?;

        Ok(self)
    }

    /// Check if the server is initialized.
    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Refresh the list of available tools, following pagination cursors.
    ///
    /// Stops early if the server hands back a cursor it already gave.
    pub async fn refresh_tools(&self) -> Result<()> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let params = ListToolsParams { cursor };
            let page: ListToolsResult = self.request("tools/list", Some(params)).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    warn!(
                        server = %self.config.name,
                        cursor = %next,
                        "tools/list cursor repeated"
                    );
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(server = %self.config.name, count = tools.len(), "discovered tools");
        *self.tools.lock().await = tools;
        Ok(())
    }

    /// Get the list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result with `is_error` set is still `Ok`: the tool ran and reported
    /// a failure, which callers usually want to relay rather than abort on.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        if !*self.initialized.lock().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        self.request("tools/call", Some(params)).await
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Shut down the server: close its stdin, then kill it if it lingers.
    pub async fn shutdown(self) -> Result<()> {
        let Self { stdin, process, .. } = self;
        drop(stdin);

        let mut process = process.into_inner();
        if timeout(SHUTDOWN_GRACE, process.wait()).await.is_err() {
            process.kill().await?;
        }

        Ok(())
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        trace!(server = %self.config.name, %method, ?id, "sending request");
        self.write_message(&request).await?;

        let response = match self.config.timeout {
            Some(limit) => timeout(limit, self.await_response(&id))
                .await
                .map_err(|_| Error::Timeout {
                    method: method.to_string(),
                })??,
            None => self.await_response(&id).await?,
        };

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.write_message(&JsonRpcNotification::new(method)).await
    }

    async fn write_message(&self, message: &impl Serialize) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read until the response for `id` arrives.
    ///
    /// Notifications are dropped, as are late replies to earlier requests
    /// that timed out. Server-initiated `ping` requests are answered; any
    /// other server request is refused.
    async fn await_response(&self, id: &RequestId) -> Result<JsonRpcResponse> {
        loop {
            match self.read_message().await? {
                JsonRpcMessage::Response(response) if &response.id == id => return Ok(response),
                JsonRpcMessage::Response(response) if is_stale(&response.id, id) => {
                    debug!(
                        server = %self.config.name,
                        id = ?response.id,
                        "dropping late response"
                    );
                }
                JsonRpcMessage::Response(response) => {
                    return Err(Error::InvalidResponse(format!(
                        "response ID mismatch: expected {id:?}, got {:?}",
                        response.id
                    )));
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!(
                        server = %self.config.name,
                        method = %notification.method,
                        "skipping server notification"
                    );
                }
                JsonRpcMessage::Request(request) => {
                    let reply = if request.method == "ping" {
                        JsonRpcResponse::success(request.id, serde_json::json!({}))
                    } else {
                        debug!(
                            server = %self.config.name,
                            method = %request.method,
                            "refusing server request"
                        );
                        JsonRpcResponse::failure(
                            request.id,
                            JsonRpcError::method_not_found(&request.method),
                        )
                    };
                    self.write_message(&reply).await?;
                }
            }
        }
    }

    /// Read the next message. A timeout may cancel this mid-line, so the
    /// partial line is kept in the inbox for the next read.
    async fn read_message(&self) -> Result<JsonRpcMessage> {
        let mut inbox = self.stdout.lock().await;
        let Inbox { reader, pending } = &mut *inbox;
        loop {
            let bytes_read = reader.read_until(b'\n', pending).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }

            let line = std::mem::take(pending);
            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            if line.trim_ascii().is_empty() {
                continue;
            }

            return Ok(serde_json::from_slice(&line)?);
        }
    }
}

/// A numeric reply older than the one awaited belongs to an abandoned request.
fn is_stale(got: &RequestId, awaited: &RequestId) -> bool {
    match (got, awaited) {
        (RequestId::Number(got), RequestId::Number(awaited)) => got < awaited,
        _ => false,
    }
}
