//! Newline-delimited JSON-RPC serving loop.

use crate::tools;
use mcp::{
    CallToolParams, Implementation, InitializeResult, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ToolsCapability,
};
use serde_json::{Value, json};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "tether-toolbox";

/// Serve requests from `reader` until it closes, answering on `writer`.
pub async fn serve<R, W>(reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&line) {
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    info!("input closed, shutting down");
    Ok(())
}

/// Answer one line of input. Notifications and stray responses get no reply.
pub fn handle_line(line: &str) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparsable input");
            return Some(JsonRpcResponse::failure(
                RequestId::Null,
                JsonRpcError::parse_error(e.to_string()),
            ));
        }
    };

    match serde_json::from_value::<JsonRpcMessage>(value) {
        Ok(JsonRpcMessage::Request(request)) => Some(handle_request(request)),
        Ok(JsonRpcMessage::Notification(notification)) => {
            debug!(method = %notification.method, "notification");
            None
        }
        Ok(JsonRpcMessage::Response(response)) => {
            debug!(id = ?response.id, "ignoring response");
            None
        }
        Err(e) => Some(JsonRpcResponse::failure(
            RequestId::Null,
            JsonRpcError::new(JsonRpcError::INVALID_REQUEST, e.to_string()),
        )),
    }
}

fn handle_request(request: JsonRpcRequest) -> JsonRpcResponse {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;
    debug!(?id, %method, "request");

    let result = match method.as_str() {
        "initialize" => to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        }),
        "ping" => Ok(json!({})),
        "tools/list" => to_value(ListToolsResult {
            tools: tools::list(),
            next_cursor: None,
        }),
        "tools/call" => call_tool(params),
        other => Err(JsonRpcError::method_not_found(other)),
    };

    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::failure(id, error),
    }
}

fn call_tool(params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: CallToolParams = params
        .ok_or_else(|| JsonRpcError::invalid_params("missing params"))
        .and_then(|p| {
            serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
        })?;
    to_value(tools::call(params)?)
}

fn to_value(result: impl serde::Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(result)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}
