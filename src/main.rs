//! # docrag CLI
//!
//! ```bash
//! docrag ingest ./docs ./notes/plan.pdf
//! docrag search "release schedule" -k 5 --order hybrid
//! docrag chat "When is the next release?"
//! docrag serve        # MCP over stdio
//! docrag serve-http   # REST API on server.bind
//! ```
//!
//! Every command prints its result as pretty JSON on stdout; logs go to
//! stderr (`RUST_LOG` controls the level, default `info`).
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag::app::{AppContext, FileFilter};
use docrag::config::{Config, DEFAULT_CONFIG_PATH};
use docrag::db::Db;
use docrag::embedder::Embedder;
use docrag::embedder::download::{all_files_present, download_model_files};
use docrag::embedder::mock::MockEmbedder;
use docrag::embedder::onnx::OnnxEmbedder;
use docrag::llm::{ChatModel, OpenAiChatModel};
use docrag::mcp::McpServer;
use docrag::rag::RankOrder;

/// Local document RAG: ingest PDF, DOCX, text and Markdown files, then search
/// them or ask grounded questions.
#[derive(Parser)]
#[command(name = "docrag", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Use deterministic hash embeddings instead of the ONNX model.
    #[arg(long, global = true)]
    mock_embedder: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index files and directories. Re-indexing a path replaces its records.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Semantic search.
    Search {
        query: String,

        /// Number of results (defaults to `search.top_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// relevance | mtime_desc | hybrid
        #[arg(long, default_value = "relevance")]
        order: RankOrder,
    },

    /// Answer a question from the indexed documents.
    Chat {
        query: String,

        /// Passages handed to the model (defaults to `search.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// relevance | mtime_desc | hybrid
        #[arg(long, default_value = "relevance")]
        order: RankOrder,
    },

    /// Remove a document from the index.
    Delete { path: String },

    /// Delete every record.
    Reset,

    /// List indexed files, newest first.
    Files {
        /// Glob on the indexed path, e.g. `**/*.pdf`.
        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Collection statistics.
    Stats,

    /// Print the leading text of a document.
    Preview {
        path: String,

        #[arg(long)]
        nchars: Option<usize>,
    },

    /// Serve the MCP tools over stdio.
    Serve,

    /// Serve the REST API.
    ServeHttp {
        /// Address to bind (defaults to `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize result")?
    );
    Ok(())
}

/// Load the ONNX embedder, fetching the model files on first use.
async fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let model_dir = PathBuf::from(&config.model.dir);
    let model_name = config.model.name.clone();
    let dimensions = config.model.dimensions;

    tokio::task::spawn_blocking(move || -> Result<Arc<dyn Embedder>> {
        if !all_files_present(&model_dir) {
            download_model_files(&model_dir, &model_name)?;
        }
        let embedder = OnnxEmbedder::new(&model_dir, dimensions)
            .with_context(|| format!("failed to load model from {}", model_dir.display()))?;
        Ok(Arc::new(embedder))
    })
    .await
    .context("embedder loading task panicked")?
}

async fn build_context(config: Config, mock_embedder: bool) -> Result<AppContext> {
    let embedder: Arc<dyn Embedder> = if mock_embedder {
        info!("Using mock embedder ({} dimensions)", config.model.dimensions);
        Arc::new(MockEmbedder::new(config.model.dimensions))
    } else {
        load_embedder(&config).await?
    };

    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Db::open(&config.db_path, embedder.dimensions())
        .with_context(|| format!("failed to open vector store {}", config.db_path))?;

    let chat_model: Arc<dyn ChatModel> =
        Arc::new(OpenAiChatModel::new(&config.llm).context("failed to build LLM client")?);

    Ok(AppContext::new(config, db, embedder, chat_model)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;

    let ctx = build_context(config, cli.mock_embedder).await?;

    match cli.command {
        Commands::Ingest { paths } => print_json(&ctx.ingest(&paths).await?)?,
        Commands::Search { query, k, order } => print_json(&ctx.search(&query, k, order).await?)?,
        Commands::Chat {
            query,
            top_k,
            order,
        } => print_json(&ctx.chat(&query, top_k, order).await?)?,
        Commands::Delete { path } => {
            let removed = ctx.delete(&path).await?;
            print_json(&serde_json::json!({ "path": path, "removed": removed }))?;
        }
        Commands::Reset => {
            let deleted = ctx.reset().await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Commands::Files { pattern, limit } => {
            print_json(&ctx.list_files(&FileFilter { pattern, limit }).await?)?;
        }
        Commands::Stats => print_json(&ctx.stats().await?)?,
        Commands::Preview { path, nchars } => print_json(&ctx.preview(&path, nchars).await?)?,
        Commands::Serve => McpServer::new(ctx).start().await?,
        Commands::ServeHttp { bind } => {
            let bind = bind.unwrap_or_else(|| ctx.config().server.bind.clone());
            docrag::http::serve(ctx, &bind).await?;
        }
    }

    Ok(())
}
