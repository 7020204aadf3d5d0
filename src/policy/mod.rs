//! Per-package trust policies.
//!
//! A policy lives at `<scope>/<package>/policy.yaml` in the policy
//! repository and declares which trust architectures apply to the package.

pub mod store;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProvError, Result};

pub use store::PolicyStore;

/// File name every policy document is stored under.
pub const POLICY_FILE: &str = "policy.yaml";

/// A parsed policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(skip)]
    pub scope: String,
    #[serde(skip)]
    pub package: String,
    /// Source repository, e.g. `github.com/kjd/idna`.
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub rebuilder: Option<RebuilderPolicy>,
    #[serde(default)]
    pub build_monitor: Option<BuildMonitorPolicy>,
    #[serde(default)]
    pub provenance_upload: Option<ProvenanceUploadPolicy>,
    /// SHA-256 hex of the exact bytes the document was parsed from.
    #[serde(skip)]
    pub digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebuilderPolicy {
    /// Directory of the build manifest within the source repository.
    #[serde(default)]
    pub package_root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMonitorPolicy {
    pub github_actions: GitHubActionsPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubActionsPolicy {
    /// Workflow name, matched exactly.
    pub workflow: String,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
    #[serde(default)]
    pub require_succeeded: Option<CompletionSpec>,
}

/// A CI-produced archive and the entries within it that are release files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A job, optionally narrowed to one of its steps, that must have succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSpec {
    pub job: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceUploadPolicy {
    /// Principal identities allowed to upload provenance.
    #[serde(default)]
    pub authorized_builders: Vec<String>,
}

/// SHA-256 hex of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl PolicyDocument {
    /// Parse raw policy bytes for `scope`/`package`.
    ///
    /// `file` only labels parse errors.
    pub fn parse(scope: &str, package: &str, file: &str, bytes: &[u8]) -> Result<Self> {
        let mut doc: PolicyDocument =
            serde_yaml::from_slice(bytes).map_err(|e| ProvError::Parse {
                file: file.to_string(),
                message: e.to_string(),
            })?;
        doc.validate().map_err(|message| ProvError::Parse {
            file: file.to_string(),
            message,
        })?;
        doc.scope = scope.to_string();
        doc.package = package.to_string();
        doc.digest = digest(bytes);
        Ok(doc)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if (self.rebuilder.is_some() || self.build_monitor.is_some()) && self.repo.trim().is_empty()
        {
            return Err("rebuilder and build_monitor require 'repo'".into());
        }
        if let Some(monitor) = &self.build_monitor {
            let gha = &monitor.github_actions;
            if gha.workflow.trim().is_empty() {
                return Err("build_monitor.github_actions.workflow must not be empty".into());
            }
            for spec in &gha.artifacts {
                for pattern in &spec.patterns {
                    glob::Pattern::new(pattern)
                        .map_err(|e| format!("artifact '{}' pattern '{pattern}': {e}", spec.name))?;
                }
            }
        }
        Ok(())
    }

    /// Names of the trust architectures this policy enables.
    pub fn architectures(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.rebuilder.is_some() {
            names.push("rebuilder");
        }
        if self.build_monitor.is_some() {
            names.push("build_monitor");
        }
        if self.provenance_upload.is_some() {
            names.push("provenance_upload");
        }
        names
    }

    pub fn require_rebuilder(&self) -> Result<&RebuilderPolicy> {
        self.rebuilder
            .as_ref()
            .ok_or_else(|| ProvError::BadRequest("policy does not define rebuilder".into()))
    }

    pub fn require_build_monitor(&self) -> Result<&GitHubActionsPolicy> {
        self.build_monitor
            .as_ref()
            .map(|m| &m.github_actions)
            .ok_or_else(|| ProvError::BadRequest("policy does not define build_monitor".into()))
    }

    pub fn require_upload(&self) -> Result<&ProvenanceUploadPolicy> {
        self.provenance_upload.as_ref().ok_or_else(|| {
            ProvError::BadRequest("policy does not define provenance_upload".into())
        })
    }
}
