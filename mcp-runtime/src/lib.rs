//! JSON-RPC 2.0 MCP server for the gateway. The same dispatch core serves
//! two carriers: Content-Length framed messages over stdio, and messages
//! relayed by the HTTP event-stream transport.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use axon_core::config::ToolArg;
use axon_core::error::codes;
use axon_core::inputs::{self, InputDeclaration};
use axon_runtime::{Gateway, GatewayError};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server over the gateway's route table. One instance per process; all
/// state lives in the shared read-only [`Gateway`].
pub struct McpServer {
    gateway: Arc<Gateway>,
}

impl McpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Serve the single long-lived stdio session. Returns when stdin closes;
    /// an I/O failure here ends the sole session and thus the process.
    pub async fn serve_stdio(&self) -> Result<(), String> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();

        tracing::info!(agent = self.gateway.agent_name(), "serving MCP over stdio");
        self.serve(&mut reader, &mut stdout).await
    }

    /// Drive the message loop over any framed byte stream.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let incoming = read_framed_json(reader)
                .await
                .map_err(|err| format!("failed to read MCP message: {err}"))?;
            let Some(incoming) = incoming else {
                break;
            };

            let responses = self.handle_incoming_message(incoming).await;
            for response in responses {
                write_framed_json(writer, &response)
                    .await
                    .map_err(|err| format!("failed to write MCP response: {err}"))?;
            }
        }

        Ok(())
    }

    /// Handle one incoming payload, which may be a single message or a
    /// batch. Notifications produce no response entry.
    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; this server issues no outbound
            // requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method).await;
            None
        }
    }

    async fn handle_notification(&self, method: &str) {
        if matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            return;
        }
        tracing::debug!(method, "ignoring unknown notification");
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": self.gateway.agent_name(),
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": self.gateway.description()
        })
    }

    /// Advertise the route table: the agent (when exposed) as a tool named
    /// after itself, plus one entry per tool route.
    fn tools_list_payload(&self) -> Value {
        let routes = self.gateway.routes();
        let mut tools = Vec::new();

        if routes.has_agent() {
            tools.push(json!({
                "name": self.gateway.agent_name(),
                "description": routes.agent_summary().unwrap_or_default(),
                "inputSchema": agent_input_schema(self.gateway.declared_inputs()),
            }));
        }

        for (name, summary) in routes.tool_routes() {
            let schema = self
                .gateway
                .tool(name)
                .map(|descriptor| tool_input_schema(&descriptor.arguments))
                .unwrap_or_else(empty_object_schema);
            tools.push(json!({
                "name": name,
                "description": summary,
                "inputSchema": schema,
            }));
        }

        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let routes = self.gateway.routes();
        let result = if routes.has_agent() && name == self.gateway.agent_name() {
            self.gateway
                .invoke_agent(&args)
                .await
                .map(Value::Object)
        } else {
            self.gateway
                .invoke_tool(name, args)
                .await
                .map(|value| json!({ "result": value }))
        };

        Ok(match result {
            Ok(envelope) => build_tool_call_response(envelope, false),
            Err(err) => {
                tracing::error!(tool = name, error = %err, "tool call failed");
                build_tool_call_response(error_envelope(&err), true)
            }
        })
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn agent_input_schema(declared: &InputDeclaration) -> Value {
    let mut properties = Map::new();
    for (name, default) in declared {
        let mut property = Map::new();
        property.insert("type".to_string(), json!("string"));
        if let Some(default) = default {
            if !default.is_null() {
                property.insert("default".to_string(), default.clone());
            }
        }
        properties.insert(name.clone(), Value::Object(property));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": inputs::required_inputs(declared),
    })
}

fn tool_input_schema(arguments: &[ToolArg]) -> Value {
    let mut properties = Map::new();
    for arg in arguments {
        let mut property = Map::new();
        property.insert("type".to_string(), json!("string"));
        property.insert("description".to_string(), json!(arg.description));
        if !arg.example.is_empty() {
            property.insert("examples".to_string(), json!([arg.example]));
        }
        properties.insert(arg.name.clone(), Value::Object(property));
    }
    let required: Vec<&str> = arguments.iter().map(|arg| arg.name.as_str()).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn error_envelope(err: &GatewayError) -> Value {
    let code = match err {
        GatewayError::Input(_) => codes::VALIDATION_FAILED,
        GatewayError::UnknownTool(_) => codes::NOT_FOUND,
        GatewayError::Runner(_) | GatewayError::Tool(_) => codes::EXECUTION_FAILED,
    };
    json!({
        "error": code,
        "message": err.to_string(),
    })
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

/// Read one Content-Length framed JSON message. `Ok(None)` is a clean EOF
/// between messages.
pub async fn read_framed_json<R>(reader: &mut R) -> Result<Option<Value>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        if line == "\r\n" || line == "\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    serde_json::from_slice(&body).map(Some).map_err(|err| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid JSON body: {err}"),
        )
    })
}

pub async fn write_framed_json<W>(writer: &mut W, value: &Value) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|err| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {err}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
