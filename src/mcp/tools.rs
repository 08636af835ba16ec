/// MCP tool handlers for docrag.
///
/// 1. ingest          – index files and directories
/// 2. search          – ranked semantic search
/// 3. chat            – grounded answer with citations
/// 4. delete_document – remove one document from the index
/// 5. reset_index     – drop every record
/// 6. list_files      – indexed files, newest first
/// 7. stats           – collection statistics
/// 8. preview         – leading text of a document
use crate::app::{AppContext, FileFilter};
use crate::error::RagError;
use crate::rag::RankOrder;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct IngestParams {
    /// Files or directories to index (directories are walked recursively)
    pub paths: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search query (natural language)
    pub query: String,
    /// Max results (default from config, usually 5)
    pub k: Option<usize>,
    /// Ordering: relevance | mtime_desc | hybrid (default: relevance)
    pub order: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ChatParams {
    /// Question to answer from the indexed documents
    pub query: String,
    /// Number of passages handed to the model (default from config)
    pub top_k: Option<usize>,
    /// Ordering: relevance | mtime_desc | hybrid (default: relevance)
    pub order: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct PathParam {
    /// Path of the document
    pub path: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListFilesParams {
    /// Glob on the indexed path (e.g. '**/*.pdf')
    pub pattern: Option<String>,
    /// Max files returned
    pub limit: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
pub struct PreviewParams {
    /// Path of the document
    pub path: String,
    /// Number of characters (default: 800)
    pub nchars: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Operation failures become tool errors the client can read.
fn respond<T: Serialize>(result: Result<T, RagError>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => json_result(&value),
        Err(e) => {
            warn!("Tool call failed: {e}");
            error_result(&e.to_string())
        }
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: AppContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Index PDF, DOCX, TXT and Markdown files. Directories are walked recursively. Re-indexing a path replaces its previous content."
    )]
    pub async fn ingest(&self, params: Parameters<IngestParams>) -> Result<CallToolResult, McpError> {
        let paths = params.0.paths;
        if paths.is_empty() {
            return error_result("paths is required");
        }
        respond(self.ctx.ingest(&paths).await)
    }

    #[tool(description = "Semantic search over indexed documents, ordered by relevance, recency or a hybrid of both")]
    pub async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let order = match RankOrder::parse_or_default(p.order.as_deref()) {
            Ok(order) => order,
            Err(e) => return error_result(&e.to_string()),
        };
        respond(self.ctx.search(&p.query, p.k, order).await)
    }

    #[tool(description = "Answer a question using only the indexed documents, with citations")]
    pub async fn chat(&self, params: Parameters<ChatParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let order = match RankOrder::parse_or_default(p.order.as_deref()) {
            Ok(order) => order,
            Err(e) => return error_result(&e.to_string()),
        };
        respond(self.ctx.chat(&p.query, p.top_k, order).await)
    }

    #[tool(description = "Remove a document from the index (the file itself is kept)")]
    pub async fn delete_document(
        &self,
        params: Parameters<PathParam>,
    ) -> Result<CallToolResult, McpError> {
        let path = params.0.path;
        respond(
            self.ctx
                .delete(&path)
                .await
                .map(|removed| serde_json::json!({ "path": path, "removed": removed })),
        )
    }

    #[tool(description = "Delete every record from the index")]
    pub async fn reset_index(&self) -> Result<CallToolResult, McpError> {
        respond(
            self.ctx
                .reset()
                .await
                .map(|deleted| serde_json::json!({ "deleted": deleted })),
        )
    }

    #[tool(description = "List indexed files, most recently modified first")]
    pub async fn list_files(
        &self,
        params: Parameters<ListFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let filter = FileFilter {
            pattern: params.0.pattern,
            limit: params.0.limit,
        };
        respond(
            self.ctx
                .list_files(&filter)
                .await
                .map(|files| serde_json::json!({ "files": files })),
        )
    }

    #[tool(description = "Collection statistics: record and file counts, model names")]
    pub async fn stats(&self) -> Result<CallToolResult, McpError> {
        respond(self.ctx.stats().await)
    }

    #[tool(description = "Return the first characters of a document's extracted text")]
    pub async fn preview(&self, params: Parameters<PreviewParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        respond(self.ctx.preview(&p.path, p.nchars).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_context;
    use crate::rag::answer::tests::ScriptedModel;
    use std::sync::Arc;

    fn tools() -> AppTools {
        AppTools::new(test_context(Arc::new(ScriptedModel::replying("ok"))))
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["text"].as_str())
            .collect()
    }

    fn is_error(result: &CallToolResult) -> bool {
        serde_json::to_value(result).unwrap()["isError"] == serde_json::json!(true)
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello tools").unwrap();
        let tools = tools();

        let ingested = tools
            .ingest(Parameters(IngestParams {
                paths: vec![dir.path().to_string_lossy().to_string()],
            }))
            .await
            .unwrap();
        assert!(!is_error(&ingested));
        let stats: serde_json::Value = serde_json::from_str(&text_of(&ingested)).unwrap();
        assert_eq!(stats["files_ingested"], 1);

        let found = tools
            .search(Parameters(SearchParams {
                query: "hello tools".to_string(),
                k: Some(3),
                order: Some("hybrid".to_string()),
            }))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&text_of(&found)).unwrap();
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_order_is_tool_error() {
        let result = tools()
            .search(Parameters(SearchParams {
                query: "q".to_string(),
                k: None,
                order: Some("sideways".to_string()),
            }))
            .await
            .unwrap();
        assert!(is_error(&result));
        assert!(text_of(&result).contains("sideways"));
    }

    #[tokio::test]
    async fn test_empty_ingest_is_tool_error() {
        let result = tools()
            .ingest(Parameters(IngestParams { paths: Vec::new() }))
            .await
            .unwrap();
        assert!(is_error(&result));
    }
}
