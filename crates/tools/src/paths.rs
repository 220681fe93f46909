//! Path validation shared by the document tools.
//!
//! Paths are always relative to a configured root and must not escape it,
//! whether via `..` components, absolute paths, or a symlink.

use std::path::{Component, Path, PathBuf};

/// Validate and resolve a requested path within `root`.
///
/// 1. Rejects absolute paths.
/// 2. Rejects raw `..` components in the input before any resolution.
/// 3. Canonicalizes `root` and checks the resolved path is still contained
///    within it, walking up to the nearest existing ancestor first when the
///    target itself doesn't exist yet.
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the root (got '{requested}')"
        ));
    }

    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".to_owned());
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve root '{}': {e}", root.display()))?;

    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| format!("cannot resolve ancestor of '{}': {e}", candidate.display()))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path '{}' resolves outside root '{}'",
            requested,
            canonical_root.display()
        ));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_parent_traversal() {
        let root = TempDir::new().unwrap();
        let result = validate_path(root.path(), "../etc/passwd");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains(".."));
    }

    #[test]
    fn rejects_absolute_path() {
        let root = TempDir::new().unwrap();
        let abs = if cfg!(windows) { "C:\\Windows" } else { "/etc/passwd" };
        let result = validate_path(root.path(), abs);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_path() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.md"), "hello").unwrap();
        let resolved = validate_path(root.path(), "a.md").unwrap();
        assert!(resolved.ends_with("a.md"));
    }
}
