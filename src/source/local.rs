use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::FileTree;
use crate::error::Result;

/// A `FileTree` over a checked-out working copy.
///
/// Serves whatever is on disk regardless of the requested revision.
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileTree for LocalTree {
    async fn get_file(&self, path: &str, revision: &str) -> Result<Option<Vec<u8>>> {
        tracing::trace!(path, revision, "reading working copy");
        let full = self.root.join(path);
        if !full.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(full)?))
    }

    async fn list_files(&self, root: &str, _revision: &str) -> Result<Vec<String>> {
        let start = self.root.join(root);
        let mut files = Vec::new();
        for entry in WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
        Ok(files)
    }
}
