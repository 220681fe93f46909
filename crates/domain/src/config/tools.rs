use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Filesystem root the `doc_view`/`doc_tree`/`doc_search` default
    /// implementation resolves paths against.
    #[serde(default = "d_documents_root")]
    pub documents_root: PathBuf,
    #[serde(default = "d_doc_search_results_cap")]
    pub doc_search_results_cap: usize,
    #[serde(default = "d_doc_tree_max_depth")]
    pub doc_tree_max_depth: u32,
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            documents_root: d_documents_root(),
            doc_search_results_cap: d_doc_search_results_cap(),
            doc_tree_max_depth: d_doc_tree_max_depth(),
            web_search: WebSearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WebSearchProvider {
    #[default]
    Tavily,
    Brave,
    Serper,
    Exa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub provider: WebSearchProvider,
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: WebSearchProvider::default(),
            api_key_env: d_api_key_env(),
        }
    }
}

fn d_documents_root() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn d_doc_search_results_cap() -> usize {
    25
}
fn d_doc_tree_max_depth() -> u32 {
    5
}
fn d_api_key_env() -> String {
    "WEB_SEARCH_API_KEY".into()
}
