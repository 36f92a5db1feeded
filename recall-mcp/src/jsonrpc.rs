//! JSON-RPC plumbing for the stdio transport.
//!
//! Accepts both line-delimited JSON and LSP-style Content-Length framing,
//! and answers in whichever framing the request arrived in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Read the next message. Returns `(body, content_length_framed)`, or
/// `None` at EOF. Non-protocol lines (stray logs on stdin) are skipped.
pub fn read_message<R: BufRead + Read>(reader: &mut R) -> io::Result<Option<(String, bool)>> {
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('{') {
            return Ok(Some((trimmed.to_string(), false)));
        }
        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let length: usize = trimmed
                .split_once(':')
                .and_then(|(_, v)| v.trim().parse().ok())
                .unwrap_or(0);
            // Consume the rest of the header block.
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
                    break;
                }
            }
            if length == 0 {
                continue;
            }
            let mut body = vec![0u8; length];
            reader.read_exact(&mut body)?;
            return Ok(Some((String::from_utf8_lossy(&body).into_owned(), true)));
        }
        // Anything else is noise.
    }
}

/// Write a response in the requested framing.
pub fn write_message<W: Write>(writer: &mut W, body: &str, framed: bool) -> io::Result<()> {
    if framed {
        write!(writer, "Content-Length: {}\r\n\r\n{body}", body.len())?;
    } else {
        writeln!(writer, "{body}")?;
    }
    writer.flush()
}
