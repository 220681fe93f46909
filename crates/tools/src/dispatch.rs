//! Tool dispatch: name → handler, producing a [`ToolResult`] ready to append
//! to the turn as a `tool_result` block.
//!
//! Grounded on the teacher's `dispatch_tool` in the gateway runtime: a flat
//! match over the tool name, each arm deserializing its own argument shape
//! and returning `(content, is_error)` rather than propagating a `Result`
//! out of dispatch itself — a tool failure is data, not a dispatch failure.

use std::sync::Arc;

use dw_domain::tool::{ToolCall, ToolResult};

use crate::documents::{DocTreeNode, DocView, DocumentService};
use crate::search::SearchService;
use crate::web_search::WebSearchClient;

#[derive(serde::Deserialize)]
struct DocViewArgs {
    path: String,
}

#[derive(serde::Deserialize)]
struct DocTreeArgs {
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
}

#[derive(serde::Deserialize)]
struct DocSearchArgs {
    query: String,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

#[derive(serde::Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
    #[serde(default)]
    topic: Option<String>,
}

const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Owns the collaborators tool calls dispatch to. Cheap to clone — everything
/// inside is an `Arc`.
#[derive(Clone)]
pub struct ToolDispatcher {
    documents: Arc<dyn DocumentService>,
    search: Arc<dyn SearchService>,
    web_search: Option<Arc<dyn WebSearchClient>>,
}

impl ToolDispatcher {
    pub fn new(
        documents: Arc<dyn DocumentService>,
        search: Arc<dyn SearchService>,
        web_search: Option<Arc<dyn WebSearchClient>>,
    ) -> Self {
        Self {
            documents,
            search,
            web_search,
        }
    }

    /// Execute one tool call, never returning an `Err` — a dispatch or
    /// execution failure becomes `ToolResult { is_error: true, .. }` so the
    /// model can react to it, per the tool executor's contract.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let (content, is_error) = match call.tool_name.as_str() {
            "doc_view" => self.dispatch_doc_view(&call.input).await,
            "doc_tree" => self.dispatch_doc_tree(&call.input).await,
            "doc_search" => self.dispatch_doc_search(&call.input).await,
            "web_search" | "tavily_web_search" | "brave_web_search" | "serper_web_search"
            | "exa_web_search" => self.dispatch_web_search(&call.input).await,
            other => (format!("unknown tool '{other}'"), true),
        };
        ToolResult {
            tool_use_id: call.tool_use_id.clone(),
            is_error,
            content,
        }
    }

    async fn dispatch_doc_view(&self, input: &serde_json::Value) -> (String, bool) {
        let args: DocViewArgs = match serde_json::from_value(input.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("invalid doc_view arguments: {e}"), true),
        };
        match self.documents.view(&args.path).await {
            Ok(DocView::Document { content }) => (content, false),
            Ok(view @ DocView::Folder { .. }) => {
                (serde_json::to_string_pretty(&view).unwrap_or_default(), false)
            }
            Err(e) => (e, true),
        }
    }

    async fn dispatch_doc_tree(&self, input: &serde_json::Value) -> (String, bool) {
        let args: DocTreeArgs = match serde_json::from_value(input.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("invalid doc_tree arguments: {e}"), true),
        };
        match self.documents.tree(args.folder.as_deref(), args.depth).await {
            Ok(tree) => (render_tree(&tree), false),
            Err(e) => (e, true),
        }
    }

    async fn dispatch_doc_search(&self, input: &serde_json::Value) -> (String, bool) {
        let args: DocSearchArgs = match serde_json::from_value(input.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("invalid doc_search arguments: {e}"), true),
        };
        let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let offset = args.offset.unwrap_or(0);
        match self
            .search
            .search(&args.query, args.folder.as_deref(), limit, offset)
            .await
        {
            Ok(results) => (serde_json::to_string_pretty(&results).unwrap_or_default(), false),
            Err(e) => (e, true),
        }
    }

    async fn dispatch_web_search(&self, input: &serde_json::Value) -> (String, bool) {
        let Some(client) = &self.web_search else {
            return (
                "web_search is not configured on this deployment".to_string(),
                true,
            );
        };
        let args: WebSearchArgs = match serde_json::from_value(input.clone()) {
            Ok(a) => a,
            Err(e) => return (format!("invalid web_search arguments: {e}"), true),
        };
        match client
            .search(&args.query, args.max_results, args.topic.as_deref())
            .await
        {
            Ok(value) => (value.to_string(), false),
            Err(e) => (e, true),
        }
    }
}

fn render_tree(node: &DocTreeNode) -> String {
    serde_json::to_string_pretty(node).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::FsDocumentService;
    use crate::search::FsSearchService;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn dispatcher(root: &std::path::Path) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(FsDocumentService::new(root, 5)),
            Arc::new(FsSearchService::new(root, 25)),
            None,
        )
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            tool_use_id: Uuid::new_v4().to_string(),
            tool_name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn doc_view_returns_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "hi").unwrap();
        let d = dispatcher(dir.path());
        let result = d.dispatch(&call("doc_view", serde_json::json!({"path": "a.md"}))).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_result_not_panic() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(dir.path());
        let result = d.dispatch(&call("not_a_real_tool", serde_json::json!({}))).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn web_search_without_client_is_error_result() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(dir.path());
        let result = d
            .dispatch(&call("web_search", serde_json::json!({"query": "rust"})))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn malformed_arguments_is_error_result_not_panic() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(dir.path());
        let result = d.dispatch(&call("doc_view", serde_json::json!({"wrong_field": 1}))).await;
        assert!(result.is_error);
    }
}
