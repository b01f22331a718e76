/// Line-delimited JSON-RPC 2.0 tool server on stdio.
///
/// Exposes one tool, `reply_to_telegram`, which sends text to a conversation
/// through the chat platform. Stdout carries protocol frames only; all logging
/// goes elsewhere.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::chat::platform::ChatPlatform;
use crate::chat::types::ConversationId;
use crate::errors::{BridgeError, BridgeResult};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "gravity-bridge";
pub const REPLY_TOOL: &str = "reply_to_telegram";

const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;
const TOOL_FAILURE: i64 = -32000;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Map<String, Value>,
}

pub struct McpServer {
    platform: Arc<dyn ChatPlatform>,
}

impl McpServer {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self { platform }
    }

    /// `None` for notifications, which never get a response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.method.starts_with("notifications/") {
            tracing::debug!(method = %request.method, "notification");
            return None;
        }
        let id = request.id?;

        let outcome = match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            })),
            "tools/list" => Ok(json!({ "tools": [reply_tool_schema()] })),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {other}"),
            }),
        };

        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(e) => {
                tracing::warn!(code = e.code, message = %e.message, "request failed");
                (None, Some(e))
            }
        };
        Some(JsonRpcResponse {
            jsonrpc: "2.0",
            result,
            error,
            id,
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let call: ToolCall = serde_json::from_value(params).map_err(|e| JsonRpcError {
            code: INVALID_PARAMS,
            message: format!("Invalid params: {e}"),
        })?;
        if call.name != REPLY_TOOL {
            return Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Tool not found: {}", call.name),
            });
        }

        let chat_id = argument(&call.arguments, "chat_id");
        let text = argument(&call.arguments, "text");
        tracing::info!(chat_id = %chat_id, chars = text.chars().count(), "reply_to_telegram");

        self.reply(&chat_id, &text).await.map_err(|e| JsonRpcError {
            code: TOOL_FAILURE,
            message: format!("Telegram Error: {e}"),
        })?;
        Ok(json!({
            "content": [{ "type": "text", "text": "Message sent successfully" }]
        }))
    }

    /// Literal `\n` escape sequences become real newlines before sending.
    async fn reply(&self, chat_id: &str, text: &str) -> BridgeResult<()> {
        let conversation: ConversationId = chat_id
            .parse()
            .map_err(|e| BridgeError::Protocol(format!("invalid chat_id {chat_id:?}: {e}")))?;
        let text = text.replace("\\n", "\n");
        self.platform.send_text(conversation, &text).await
    }

    /// Reads requests line by line and answers each on its own task.
    /// Writes are serialized so frames never interleave. Returns at EOF once
    /// in-flight requests have been answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> BridgeResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut in_flight = JoinSet::new();
        let mut lines = reader.lines();

        tracing::info!("tool server listening on stdio");
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed request line skipped");
                    continue;
                }
            };

            let server = self.clone();
            let writer = writer.clone();
            in_flight.spawn(async move {
                let Some(response) = server.handle(request).await else {
                    return;
                };
                if let Err(e) = write_frame(&writer, &response).await {
                    tracing::error!(error = %e, "failed to write response");
                }
            });
        }

        while in_flight.join_next().await.is_some() {}
        tracing::info!("stdin closed; tool server stopped");
        Ok(())
    }

    pub async fn serve_stdio(self: Arc<Self>) -> BridgeResult<()> {
        self.serve(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &Mutex<W>, response: &JsonRpcResponse) -> BridgeResult<()> {
    let mut frame = serde_json::to_vec(response)?;
    frame.push(b'\n');
    let mut out = writer.lock().await;
    out.write_all(&frame).await?;
    out.flush().await?;
    Ok(())
}

/// String arguments; numbers are accepted too (chat ids often arrive as numbers).
fn argument(arguments: &serde_json::Map<String, Value>, key: &str) -> String {
    match arguments.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn reply_tool_schema() -> Value {
    json!({
        "name": REPLY_TOOL,
        "description": "Send a message reply to a Telegram Chat ID",
        "inputSchema": {
            "type": "object",
            "properties": {
                "chat_id": { "type": "string", "description": "The Telegram Chat ID to reply to" },
                "text": { "type": "string", "description": "The content of the message" }
            },
            "required": ["chat_id", "text"]
        }
    })
}
