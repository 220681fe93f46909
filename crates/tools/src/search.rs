//! `doc_search` default implementation.
//!
//! No teacher equivalent exists for full-text search; this is the new piece
//! built directly off the component contract, kept in the same
//! trait-plus-filesystem-default shape as [`crate::documents`] so the engine
//! depends on an abstraction rather than a concrete backend.

use std::path::Path;

use serde::Serialize;

use crate::paths::validate_path;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub path: String,
    pub snippet: String,
    pub score: u32,
}

#[async_trait::async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        folder: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, String>;
}

pub struct FsSearchService {
    root: std::path::PathBuf,
    results_cap: usize,
}

impl FsSearchService {
    pub fn new(root: impl Into<std::path::PathBuf>, results_cap: usize) -> Self {
        Self {
            root: root.into(),
            results_cap,
        }
    }

    async fn collect_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), String> {
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", dir.display()))?;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| format!("failed to read entry under '{}': {e}", dir.display()))?
        {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                Box::pin(Self::collect_files(&path, out)).await?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }

    fn snippet(haystack: &str, needle_lower: &str) -> String {
        let haystack_lower = haystack.to_lowercase();
        let Some(byte_pos) = haystack_lower.find(needle_lower) else {
            return String::new();
        };
        let start = haystack[..byte_pos].char_indices().rev().nth(40).map(|(i, _)| i).unwrap_or(0);
        let end = (byte_pos + needle_lower.len() + 80).min(haystack.len());
        let end = haystack.char_indices().find(|(i, _)| *i >= end).map(|(i, _)| i).unwrap_or(haystack.len());
        let mut s = haystack[start..end].replace('\n', " ");
        if start > 0 {
            s = format!("…{s}");
        }
        if end < haystack.len() {
            s.push('…');
        }
        s
    }
}

#[async_trait::async_trait]
impl SearchService for FsSearchService {
    async fn search(
        &self,
        query: &str,
        folder: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, String> {
        if query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        let rel = folder.unwrap_or(".");
        let resolved = validate_path(&self.root, rel)?;

        let mut files = Vec::new();
        Self::collect_files(&resolved, &mut files).await?;

        let query_lower = query.to_lowercase();
        let mut scored = Vec::new();
        for path in files {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let count = content.to_lowercase().matches(&query_lower).count();
            if count == 0 {
                continue;
            }
            let rel_path = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            scored.push(SearchResult {
                path: rel_path,
                snippet: Self::snippet(&content, &query_lower),
                score: count as u32,
            });
        }

        scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));

        let effective_limit = limit.min(self.results_cap);
        Ok(scored.into_iter().skip(offset).take(effective_limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_matches_ranked_by_occurrence_count() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha alpha alpha").unwrap();
        std::fs::write(dir.path().join("b.md"), "alpha once").unwrap();
        let svc = FsSearchService::new(dir.path(), 25);

        let results = svc.search("alpha", None, 10, 0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "a.md");
        assert_eq!(results[0].score, 3);
    }

    #[tokio::test]
    async fn respects_results_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.md")), "needle").unwrap();
        }
        let svc = FsSearchService::new(dir.path(), 2);
        let results = svc.search("needle", None, 10, 0).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let dir = TempDir::new().unwrap();
        let svc = FsSearchService::new(dir.path(), 25);
        assert!(svc.search("  ", None, 10, 0).await.is_err());
    }
}
