//! `doc_view` / `doc_tree` default implementation.
//!
//! Grounded on the filesystem tool pair the teacher ships for shell-adjacent
//! file access: same path-containment discipline, generalized from a
//! flat `file_read`/`file_list` pair into a recursive bounded-depth tree walk
//! and a view that transparently handles both files and folders.

use std::path::Path;

use serde::Serialize;

use crate::paths::validate_path;

/// What `doc_view` returns for a single path.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocView {
    Document { content: String },
    Folder { entries: Vec<DocEntry> },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocTreeNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocTreeNode>,
}

/// Document access abstraction. The engine's tool executor depends on this
/// trait rather than the filesystem directly so a future non-filesystem
/// document backend can be swapped in without touching dispatch logic.
#[async_trait::async_trait]
pub trait DocumentService: Send + Sync {
    async fn view(&self, path: &str) -> Result<DocView, String>;
    async fn tree(&self, folder: Option<&str>, depth: Option<u32>) -> Result<DocTreeNode, String>;
}

pub struct FsDocumentService {
    root: std::path::PathBuf,
    max_tree_depth: u32,
}

impl FsDocumentService {
    pub fn new(root: impl Into<std::path::PathBuf>, max_tree_depth: u32) -> Self {
        Self {
            root: root.into(),
            max_tree_depth,
        }
    }

    fn clamp_depth(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(2).min(self.max_tree_depth).max(1)
    }

    async fn walk(path: &Path, rel: &str, depth_remaining: u32) -> Result<DocTreeNode, String> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("failed to stat '{rel}': {e}"))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel.to_string());

        if !metadata.is_dir() {
            return Ok(DocTreeNode {
                name,
                path: rel.to_string(),
                is_dir: false,
                children: Vec::new(),
            });
        }

        let mut children = Vec::new();
        if depth_remaining > 0 {
            let mut read_dir = tokio::fs::read_dir(path)
                .await
                .map_err(|e| format!("failed to read '{rel}': {e}"))?;
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| format!("failed to read entry under '{rel}': {e}"))?
            {
                let child_rel = if rel.is_empty() || rel == "." {
                    entry.file_name().to_string_lossy().to_string()
                } else {
                    format!("{rel}/{}", entry.file_name().to_string_lossy())
                };
                let child = Box::pin(Self::walk(&entry.path(), &child_rel, depth_remaining - 1)).await?;
                children.push(child);
            }
            children.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(DocTreeNode {
            name,
            path: rel.to_string(),
            is_dir: true,
            children,
        })
    }
}

#[async_trait::async_trait]
impl DocumentService for FsDocumentService {
    async fn view(&self, path: &str) -> Result<DocView, String> {
        let resolved = validate_path(&self.root, path)?;
        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| format!("'{path}' does not exist: {e}"))?;

        if metadata.is_dir() {
            let mut read_dir = tokio::fs::read_dir(&resolved)
                .await
                .map_err(|e| format!("failed to read '{path}': {e}"))?;
            let mut entries = Vec::new();
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| format!("failed to read entry under '{path}': {e}"))?
            {
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                entries.push(DocEntry {
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir,
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(DocView::Folder { entries })
        } else {
            let content = tokio::fs::read_to_string(&resolved)
                .await
                .map_err(|e| format!("failed to read '{path}': {e}"))?;
            Ok(DocView::Document { content })
        }
    }

    async fn tree(&self, folder: Option<&str>, depth: Option<u32>) -> Result<DocTreeNode, String> {
        let rel = folder.unwrap_or(".");
        let resolved = validate_path(&self.root, rel)?;
        let depth = self.clamp_depth(depth);
        Self::walk(&resolved, if rel == "." { "" } else { rel }, depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.md"), "hello world").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/nested.md"), "nested content").unwrap();
        dir
    }

    #[tokio::test]
    async fn view_returns_document_content() {
        let dir = setup();
        let svc = FsDocumentService::new(dir.path(), 5);
        let view = svc.view("readme.md").await.unwrap();
        match view {
            DocView::Document { content } => assert_eq!(content, "hello world"),
            _ => panic!("expected document"),
        }
    }

    #[tokio::test]
    async fn view_returns_folder_listing() {
        let dir = setup();
        let svc = FsDocumentService::new(dir.path(), 5);
        let view = svc.view(".").await.unwrap();
        match view {
            DocView::Folder { entries } => {
                assert!(entries.iter().any(|e| e.name == "readme.md"));
                assert!(entries.iter().any(|e| e.name == "sub" && e.is_dir));
            }
            _ => panic!("expected folder"),
        }
    }

    #[tokio::test]
    async fn view_rejects_path_outside_root() {
        let dir = setup();
        let svc = FsDocumentService::new(dir.path(), 5);
        assert!(svc.view("../outside.md").await.is_err());
    }

    #[tokio::test]
    async fn tree_respects_depth_cap() {
        let dir = setup();
        std::fs::create_dir_all(dir.path().join("sub/deep/deeper")).unwrap();
        let svc = FsDocumentService::new(dir.path(), 5);
        let node = svc.tree(None, Some(1)).await.unwrap();
        let sub = node.children.iter().find(|c| c.name == "sub").unwrap();
        assert!(sub.children.is_empty(), "depth 1 should not descend into sub/");
    }

    #[tokio::test]
    async fn tree_depth_clamped_to_configured_max() {
        let dir = setup();
        let svc = FsDocumentService::new(dir.path(), 2);
        // Requesting depth 5 against a max of 2 should not error, just clamp.
        let node = svc.tree(None, Some(5)).await.unwrap();
        assert!(node.is_dir);
    }
}
