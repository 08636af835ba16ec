//! # docrag: local document RAG engine
//!
//! Indexes PDF, DOCX, plain-text and Markdown files into a SQLite vector
//! store, then serves semantic search and grounded answers from a local
//! OpenAI-compatible language model.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with defaults and env overrides
//! - **[`db`]**: SQLite + sqlite-vec record store (atomic per-path replace, cosine search)
//! - **[`embedder`]**: Text embedding via ONNX Runtime (multilingual-e5-small)
//! - **[`collection`]**: Vector index adapter binding an embedder to the store
//! - **[`indexer`]**: Extraction, chunking, record identity and the ingestion orchestrator
//! - **[`rag`]**: Ranking (relevance / recency / hybrid) and answer assembly
//! - **[`llm`]**: Chat-completion client
//! - **[`app`]**: The shared application context behind every surface
//! - **[`mcp`]**: MCP tools over stdio (rmcp)
//! - **[`http`]**: REST API (axum)

pub mod app;
pub mod collection;
pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod http;
pub mod indexer;
pub mod llm;
pub mod mcp;
pub mod rag;
