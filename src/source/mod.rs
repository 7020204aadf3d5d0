//! Version-controlled sources: the policy repository and package source
//! repositories.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProvError, Result};

pub use local::LocalTree;

/// Host prefix of the one supported source hosting kind.
pub const GITHUB_HOST: &str = "github.com";

/// Read access to a file tree at a given revision.
#[async_trait]
pub trait FileTree: Send + Sync {
    /// File contents at `revision`, or `None` if the path does not exist.
    async fn get_file(&self, path: &str, revision: &str) -> Result<Option<Vec<u8>>>;

    /// Every file path below `root` at `revision`, relative to the tree root.
    async fn list_files(&self, root: &str, revision: &str) -> Result<Vec<String>>;
}

/// Tag, commit and file lookups on a hosted source repository.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Tag names in the order the host lists them.
    async fn list_tags(&self, repo: &RepoRef) -> Result<Vec<String>>;

    /// Hex SHA-1 of the commit `reference` points at.
    async fn commit_digest(&self, repo: &RepoRef, reference: &str) -> Result<String>;

    async fn file_exists(&self, repo: &RepoRef, path: &str, revision: &str) -> Result<bool>;
}

/// A `github.com/<owner>/<name>` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `github.com/owner/name`, with or without an `https://` scheme
    /// and trailing `.git`.
    pub fn parse(repo: &str) -> Result<Self> {
        let with_scheme = if repo.contains("://") {
            repo.to_string()
        } else {
            format!("https://{repo}")
        };
        let url = url::Url::parse(&with_scheme)
            .map_err(|e| ProvError::BadRequest(format!("invalid repository '{repo}': {e}")))?;
        if url.host_str() != Some(GITHUB_HOST) {
            return Err(ProvError::Unsupported(format!(
                "non-github repositories are not supported: {repo}"
            )));
        }
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [owner, name, ..] => Ok(Self {
                owner: (*owner).to_string(),
                name: name.trim_end_matches(".git").to_string(),
            }),
            _ => Err(ProvError::BadRequest(format!(
                "repository must be {GITHUB_HOST}/<owner>/<name>: {repo}"
            ))),
        }
    }

    /// Scheme-less form used in recipes, e.g. `github.com/kjd/idna`.
    pub fn slug(&self) -> String {
        format!("{GITHUB_HOST}/{}/{}", self.owner, self.name)
    }

    pub fn https_url(&self) -> String {
        format!("https://{}", self.slug())
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// Join repository-relative path segments, treating `.` and empty
/// segments as the root.
pub fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}
