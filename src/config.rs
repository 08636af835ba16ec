/// Configuration module for docrag.
///
/// Handles loading, validating, and providing default configuration values.
/// The model endpoint can be overridden from the environment after loading.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./vectors.db".to_string()
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_max_chars() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

fn default_write_batch_size() -> usize {
    crate::collection::DEFAULT_BATCH_SIZE
}

fn default_supported_extensions() -> Vec<String> {
    ["pdf", "docx", "txt", "md"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_top_k() -> usize {
    5
}

fn default_overfetch() -> usize {
    3
}

fn default_snippet_chars() -> usize {
    200
}

fn default_model_name() -> String {
    "multilingual-e5-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_model_dir() -> String {
    "models/multilingual-e5-small".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_llm_api_key() -> String {
    "lm-studio".to_string()
}

fn default_llm_model() -> String {
    "phi3:mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Maximum records per write and texts per embedding call.
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,

    /// File extensions (without the dot) that ingestion accepts.
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Clamped to `max_chars - 1` when larger.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates fetched per requested result before re-ranking.
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,

    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_model_dir")]
    pub dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_api_key")]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Language the answer should be written in, e.g. `"Deutsch"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_language: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            collection_name: default_collection_name(),
            chunking: ChunkingConfig::default(),
            write_batch_size: default_write_batch_size(),
            supported_extensions: default_supported_extensions(),
            search: SearchConfig::default(),
            model: ModelConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch: default_overfetch(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            dir: default_model_dir(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: default_llm_api_key(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            answer_language: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file when the default path is used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Apply `LLM_BASE_URL`, `LLM_API_KEY` and `LLM_MODEL` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = non_empty("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = model;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.chunking.max_chars > 0,
            "chunking.max_chars must be positive"
        );
        anyhow::ensure!(
            self.write_batch_size > 0,
            "write_batch_size must be positive"
        );
        anyhow::ensure!(
            !self.supported_extensions.is_empty(),
            "at least one supported extension must be specified"
        );
        anyhow::ensure!(self.search.top_k > 0, "search.top_k must be positive");
        anyhow::ensure!(
            self.search.overfetch >= 1,
            "search.overfetch must be at least 1"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.llm.temperature),
            "llm.temperature must be within [0, 2]"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
