//! Stdio entry point for the MCP server.
//!
//! Configuration comes from the `RECALL_*` environment (optionally loaded
//! from an env file given as the first argument).

use recall_core::{config, EngineConfig, MemoryEngine};
use recall_mcp::McpServer;
use std::collections::HashMap;
use std::io::{stdin, stdout, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(config::keys::LOG).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = std::env::var(config::keys::DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./recall-data"));

    let config = match std::env::args().nth(1) {
        Some(env_file) => EngineConfig::from_env_file(&data_dir, Path::new(&env_file))?,
        None => {
            let values: HashMap<String, String> = std::env::vars()
                .filter(|(key, _)| config::keys::ALL.contains(&key.as_str()))
                .collect();
            EngineConfig::from_values(&data_dir, &values)
        }
    };

    let engine = MemoryEngine::open(config)?;
    let server = McpServer::new(engine);

    let stdin = stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout();
    server.serve(&mut reader, &mut writer)
}
