//! Retrieval results, ranking and answer assembly.
pub mod answer;
pub mod rank;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// One search hit as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: String,
    /// Cosine distance, or the combined score under hybrid ordering.
    pub score: f64,
    pub snippet: String,
    pub mtime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<SearchResult>,
}

/// Ordering applied to retrieved passages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Ascending distance.
    #[default]
    Relevance,
    /// Newest first.
    MtimeDesc,
    /// Weighted blend of relevance and recency.
    Hybrid,
}

impl RankOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::MtimeDesc => "mtime_desc",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parse an optional order string, defaulting to relevance.
    pub fn parse_or_default(value: Option<&str>) -> Result<Self, RagError> {
        value.map_or(Ok(Self::default()), str::parse)
    }
}

impl FromStr for RankOrder {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "mtime_desc" => Ok(Self::MtimeDesc),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(RagError::InvalidOrder(other.to_string())),
        }
    }
}

impl fmt::Display for RankOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First `max_chars` characters of `text` with newlines flattened to spaces.
#[must_use]
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}
