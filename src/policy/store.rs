use std::sync::Arc;

use super::{PolicyDocument, POLICY_FILE};
use crate::error::{ProvError, Result};
use crate::source::{join_path, FileTree};

/// Fetches policies from the policy repository. Read-only.
#[derive(Clone)]
pub struct PolicyStore {
    tree: Arc<dyn FileTree>,
    dir: String,
}

impl PolicyStore {
    /// `dir` is the policy hierarchy's directory within the repository.
    pub fn new(tree: Arc<dyn FileTree>, dir: impl Into<String>) -> Self {
        Self {
            tree,
            dir: dir.into(),
        }
    }

    pub fn policy_path(&self, scope: &str, package: &str) -> String {
        join_path(&[&self.dir, scope, package, POLICY_FILE])
    }

    /// Fetch and parse the policy for one package at `revision`.
    pub async fn fetch(&self, scope: &str, package: &str, revision: &str) -> Result<PolicyDocument> {
        let path = self.policy_path(scope, package);
        let bytes = self
            .tree
            .get_file(&path, revision)
            .await?
            .ok_or_else(|| ProvError::NotFound(format!("policy {path} at {revision}")))?;
        let doc = PolicyDocument::parse(scope, package, &path, &bytes)?;
        tracing::debug!(scope, package, revision, digest = %doc.digest, "fetched policy");
        Ok(doc)
    }

    /// Fetch and parse every policy in the hierarchy at `revision`.
    ///
    /// Scope and package come from the two directories directly above each
    /// `policy.yaml`, relative to the hierarchy root.
    pub async fn fetch_all(&self, revision: &str) -> Result<Vec<PolicyDocument>> {
        let root = join_path(&[&self.dir]);
        let files = self.tree.list_files(&root, revision).await?;
        let mut policies = Vec::new();

        for path in files {
            let rel = if root.is_empty() {
                path.as_str()
            } else {
                match path.strip_prefix(&root).and_then(|p| p.strip_prefix('/')) {
                    Some(rel) => rel,
                    None => continue,
                }
            };
            let segments: Vec<&str> = rel.split('/').collect();
            let [.., scope, package, file] = segments.as_slice() else {
                if segments.last() == Some(&POLICY_FILE) {
                    tracing::warn!(path = %path, "policy file is not under <scope>/<package>, skipping");
                }
                continue;
            };
            if *file != POLICY_FILE {
                continue;
            }

            let bytes = self
                .tree
                .get_file(&path, revision)
                .await?
                .ok_or_else(|| ProvError::NotFound(format!("policy {path} at {revision}")))?;
            policies.push(PolicyDocument::parse(scope, package, &path, &bytes)?);
        }

        Ok(policies)
    }
}
