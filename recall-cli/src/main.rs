//! `recall` — thin CLI over the memory engine. All logic lives in the
//! engine; the CLI holds no state of its own.

mod config;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::CliConfig;
use output::Format;
use recall_core::{
    config as core_config, providers::ChatMessage, providers::ChatOptions, EngineConfig,
    EngineMode, MemoryEngine, RecordMetadata, ScopeId, SearchRequest,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recall", version, about = "Local long-term memory engine")]
struct Cli {
    /// Data root directory (overrides config file and RECALL_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to recall.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tenant user id
    #[arg(long, global = true, default_value = "default")]
    user: String,

    /// Session id
    #[arg(long, global = true, default_value = "cli")]
    session: String,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the data root and write a starter env template
    Init,
    /// Store a memory
    Add {
        /// The content to remember
        content: String,
        /// Origin label
        #[arg(long)]
        source: Option<String>,
        /// Tags, repeatable
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Search memories
    Search {
        query: String,
        /// Number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// List recent memories
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Engine statistics
    Stats,
    /// One chat turn grounded in memory (requires a configured LLM)
    Chat { message: String },
    /// Foreshadowing hints (narrative mode)
    Foreshadow {
        #[command(subcommand)]
        action: ForeshadowAction,
    },
}

#[derive(Subcommand)]
enum ForeshadowAction {
    /// Track a new hint
    Add {
        content: String,
        #[arg(long, default_value_t = 0.5)]
        importance: f32,
    },
    /// List active hints
    List,
    /// Resolve a hint by id
    Resolve { id: String },
}

fn engine_config(cli: &Cli, file: &CliConfig) -> anyhow::Result<EngineConfig> {
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var(core_config::keys::DATA_DIR).ok().map(PathBuf::from))
        .or_else(|| file.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./recall-data"));

    let mut config = match &file.env_file {
        Some(env_file) if env_file.exists() => {
            EngineConfig::from_env_file(&data_dir, env_file)?
        }
        _ => {
            let values: HashMap<String, String> = std::env::vars()
                .filter(|(key, _)| core_config::keys::ALL.contains(&key.as_str()))
                .collect();
            EngineConfig::from_values(&data_dir, &values)
        }
    };
    config.data_dir = data_dir;

    if let Some(mode) = &file.mode {
        config = match mode.as_str() {
            "narrative" => config.with_mode(EngineMode::Narrative),
            "knowledge_base" | "knowledge-base" => config.with_mode(EngineMode::KnowledgeBase),
            _ => config.with_mode(EngineMode::General),
        };
        config.gate_overrides = None;
    }
    Ok(config)
}

/// Starter env template written by `init`. The same key set the engine
/// recognizes; identical on every platform.
const ENV_TEMPLATE: &str = "\
# recall engine configuration
RECALL_MODE=general
#RECALL_DATA_DIR=./recall-data
#RECALL_LLM_BASE_URL=
#RECALL_LLM_MODEL=
#RECALL_LLM_API_KEY=
#RECALL_EMBED_BASE_URL=
#RECALL_EMBED_MODEL=
#RECALL_EMBED_API_KEY=
#RECALL_EMBED_DIMENSION=
#RECALL_DEDUP_JACCARD=0.85
#RECALL_DEDUP_SEMANTIC_HIGH=0.90
#RECALL_DEDUP_SEMANTIC_LOW=0.70
#RECALL_RERANK_BACKEND=builtin
#RECALL_LOG=info
";

fn run_chat(engine: &MemoryEngine, scope: &ScopeId, message: &str) -> anyhow::Result<()> {
    let context = engine.context(message, scope, Vec::new(), 2000)?;
    let Some(provider) = recall_core::providers::chat_provider_from(&engine.config().llm) else {
        // Memory still works without a model; only the reply generation
        // needs one.
        println!("no LLM configured; retrieved context:\n\n{context}");
        engine.add(message, scope, RecordMetadata::default())?;
        return Ok(());
    };

    let response = provider.chat(
        &[
            ChatMessage::system(context),
            ChatMessage::user(message.to_string()),
        ],
        &ChatOptions::default(),
    )?;
    println!("{}", response.content);

    engine.add(message, scope, RecordMetadata::default())?;
    let mut reply_metadata = RecordMetadata::default();
    reply_metadata.source = Some("assistant".to_string());
    engine.add(&response.content, scope, reply_metadata)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(core_config::keys::LOG)
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = CliConfig::load(cli.config.as_deref())?;
    let format = if cli.json { Format::Json } else { Format::Text };

    let user = file.user.clone().unwrap_or_else(|| cli.user.clone());
    let session = file.session.clone().unwrap_or_else(|| cli.session.clone());
    let scope = ScopeId::without_sub_tenant(user, session);

    let config = engine_config(&cli, &file)?;

    if let Command::Init = cli.command {
        std::fs::create_dir_all(config.data_dir.join("config"))
            .context("creating data root")?;
        let template_path = config.data_dir.join("config").join("recall.env");
        if !template_path.exists() {
            let mut file = std::fs::File::create(&template_path)?;
            file.write_all(ENV_TEMPLATE.as_bytes())?;
        }
        // Opening the engine lays out the rest of the directory tree.
        let engine = MemoryEngine::open(config)?;
        engine.shutdown();
        println!("initialized {}", template_path.display());
        return Ok(());
    }

    let engine = MemoryEngine::open(config)?;
    match &cli.command {
        Command::Init => unreachable!("handled above"),
        Command::Add { content, source, tag } => {
            let mut metadata = RecordMetadata::default();
            metadata.source = source.clone();
            metadata.tags = tag.iter().cloned().collect();
            let outcome = engine.add(content, &scope, metadata)?;
            output::print_add(format, &outcome)?;
        }
        Command::Search { query, top_k } => {
            let hits = engine.search(
                &SearchRequest::new(query.as_str())
                    .in_scope(scope.clone())
                    .top_k(*top_k),
            )?;
            output::print_hits(format, &hits)?;
        }
        Command::List { limit } => {
            let records = engine.list(&scope, *limit)?;
            output::print_records(format, &records)?;
        }
        Command::Stats => {
            output::print_stats(format, &engine.stats())?;
        }
        Command::Chat { message } => {
            run_chat(&engine, &scope, message)?;
        }
        Command::Foreshadow { action } => match action {
            ForeshadowAction::Add { content, importance } => {
                match engine.foreshadow_add(content, *importance, Vec::new()) {
                    Ok(hint) => println!("tracking {}", hint.id),
                    Err(recall_core::Error::FeatureDisabled(message)) => println!("{message}"),
                    Err(e) => return Err(e.into()),
                }
            }
            ForeshadowAction::List => match engine.foreshadow_active() {
                Ok(hints) => output::print_hints(format, &hints)?,
                Err(recall_core::Error::FeatureDisabled(message)) => println!("{message}"),
                Err(e) => return Err(e.into()),
            },
            ForeshadowAction::Resolve { id } => match engine.foreshadow_resolve(id) {
                Ok(hint) => println!("resolved {}", hint.id),
                Err(recall_core::Error::FeatureDisabled(message)) => println!("{message}"),
                Err(e) => return Err(e.into()),
            },
        },
    }
    engine.shutdown();
    Ok(())
}
