//! MCP protocol handling over the in-process engine.

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::tools;
use recall_core::MemoryEngine;
use serde_json::{json, Value};
use std::io::{BufRead, Read, Write};
use tracing::{debug, error, info};

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2024-11-05"];

/// The MCP server: one engine, one stdio loop.
pub struct McpServer {
    engine: MemoryEngine,
}

impl McpServer {
    #[must_use]
    pub fn new(engine: MemoryEngine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Route one request. Returns `None` for notifications (no id).
    pub fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        debug!(method = %request.method, "request");
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize(request.params.as_ref())),
            "notifications/initialized" => return None,
            "tools/list" => JsonRpcResponse::success(id, json!({"tools": tools::tool_definitions()})),
            "tools/call" => self.call_tool(id, request.params.as_ref()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "shutdown" => {
                self.engine.shutdown();
                JsonRpcResponse::success(id, Value::Null)
            }
            other => JsonRpcResponse::failure(id, -32601, format!("method not found: {other}")),
        };
        Some(response)
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p["protocolVersion"].as_str())
            .unwrap_or_default();
        let version = if SUPPORTED_VERSIONS.contains(&requested) {
            requested
        } else {
            SUPPORTED_VERSIONS[0]
        };
        json!({
            "protocolVersion": version,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": "recall-mcp",
                "version": env!("CARGO_PKG_VERSION"),
                "mode": self.engine.gate().mode.as_str(),
            },
        })
    }

    fn call_tool(&self, id: Option<Value>, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, -32602, "params required");
        };
        let Some(name) = params["name"].as_str() else {
            return JsonRpcResponse::failure(id, -32602, "tool name required");
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));
        match tools::dispatch(&self.engine, name, &arguments) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                error!(tool = name, error = %e, "tool call failed");
                // Tool-level failures are reported in-band per MCP.
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": format!("error: {e}")}],
                        "isError": true,
                    }),
                )
            }
        }
    }

    /// The stdio serve loop: read requests until EOF.
    pub fn serve<R: BufRead + Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> anyhow::Result<()> {
        info!(mode = self.engine.gate().mode.as_str(), "MCP server ready");
        while let Some((body, framed)) = crate::jsonrpc::read_message(reader)? {
            let request: JsonRpcRequest = match serde_json::from_str(&body) {
                Ok(request) => request,
                Err(e) => {
                    let response = JsonRpcResponse::failure(None, -32700, format!("parse error: {e}"));
                    crate::jsonrpc::write_message(writer, &serde_json::to_string(&response)?, framed)?;
                    continue;
                }
            };
            let shutting_down = request.method == "shutdown";
            if let Some(response) = self.handle(&request) {
                crate::jsonrpc::write_message(writer, &serde_json::to_string(&response)?, framed)?;
            }
            if shutting_down {
                break;
            }
        }
        self.engine.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{EngineConfig, EngineMode};

    fn server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(EngineMode::General))
            .expect("open");
        (dir, McpServer::new(engine))
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[test]
    fn initialize_negotiates_version() {
        let (_dir, server) = server();
        let response = server
            .handle(&request("initialize", json!({"protocolVersion": "2024-11-05"})))
            .expect("response");
        let result = response.result.expect("result");
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["mode"], "general");
    }

    #[test]
    fn unknown_version_falls_back_to_latest() {
        let (_dir, server) = server();
        let response = server
            .handle(&request("initialize", json!({"protocolVersion": "1999-01-01"})))
            .expect("response");
        assert_eq!(
            response.result.expect("result")["protocolVersion"],
            SUPPORTED_VERSIONS[0]
        );
    }

    #[test]
    fn tools_roundtrip_through_protocol() {
        let (_dir, server) = server();
        let response = server
            .handle(&request(
                "tools/call",
                json!({
                    "name": "memory_add",
                    "arguments": {
                        "content": "protocol test fact",
                        "user_id": "u",
                        "session_id": "s",
                    },
                }),
            ))
            .expect("response");
        assert!(response.error.is_none());

        let response = server
            .handle(&request("tools/list", json!({})))
            .expect("response");
        let tools = &response.result.expect("result")["tools"];
        assert!(tools.as_array().expect("array").len() >= 14);
    }

    #[test]
    fn unknown_method_is_a_jsonrpc_error() {
        let (_dir, server) = server();
        let response = server
            .handle(&request("resources/read", json!({})))
            .expect("response");
        assert!(response.error.is_some());
    }

    #[test]
    fn serve_loop_answers_over_buffers() {
        let (_dir, server) = server();
        let input = b"{\"id\": 1, \"method\": \"ping\"}\n";
        let mut reader = std::io::BufReader::new(&input[..]);
        let mut output = Vec::new();
        server.serve(&mut reader, &mut output).expect("serve");
        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("\"jsonrpc\":\"2.0\""));
    }
}
