//! # Recall MCP
//!
//! Model Context Protocol server over the recall memory engine. Tool names
//! mirror the engine operations; transport is stdio (line-delimited JSON or
//! LSP-style Content-Length framing). All logging goes to stderr so stdout
//! stays protocol-clean.

pub mod jsonrpc;
pub mod server;
pub mod tools;

pub use server::{McpServer, SUPPORTED_VERSIONS};
