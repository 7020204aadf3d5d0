//! CI provider capability and its workflow-run model (GitHub Actions shape).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::RepoRef;

/// Conclusion reported by a job or step that completed successfully.
pub const CONCLUSION_SUCCESS: &str = "success";

#[async_trait]
pub trait CiProvider: Send + Sync {
    async fn workflows(&self, repo: &RepoRef) -> Result<Vec<Workflow>>;

    /// Runs of one workflow, in the order the provider returns them.
    async fn runs(&self, repo: &RepoRef, workflow_id: u64) -> Result<Vec<WorkflowRun>>;

    async fn jobs(&self, repo: &RepoRef, run_id: u64) -> Result<Vec<Job>>;

    async fn artifacts(&self, repo: &RepoRef, run_id: u64) -> Result<Vec<CiArtifact>>;

    /// Download a zip archive with the provider's credentials.
    async fn download_archive(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    /// Workflow file path, e.g. `.github/workflows/release.yml`.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub head_sha: String,
    /// URL of the repository the run's head commit belongs to.
    #[serde(default)]
    pub head_repository_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub steps: Vec<JobStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStep {
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// An archive uploaded by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiArtifact {
    pub name: String,
    #[serde(default)]
    pub expired: bool,
    pub archive_download_url: String,
}

pub(crate) fn succeeded(conclusion: &Option<String>) -> bool {
    conclusion.as_deref() == Some(CONCLUSION_SUCCESS)
}
