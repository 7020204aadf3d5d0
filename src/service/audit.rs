use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Rebuild,
    Monitor,
}

/// Outcome recorded for every pipeline request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    /// The rebuild ran but its output differs from the published file.
    Failed,
    NotFound,
    Error,
}

impl AuditStatus {
    pub fn for_error(err: &ProvError) -> Self {
        match err {
            ProvError::Inconsistent(_) => Self::Failed,
            ProvError::NotFound(_) => Self::NotFound,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub kind: RequestKind,
    pub package: String,
    pub version: String,
    pub status: AuditStatus,
    #[serde(default)]
    pub message: String,
    /// Digest of the policy document the request ran under.
    pub policy_version: String,
    #[serde(default)]
    pub executor_version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl AuditRecord {
    /// Open a record at the start of a request. It stays `Error` until
    /// finished.
    pub fn start(
        kind: RequestKind,
        package: &str,
        version: Option<&str>,
        policy_version: &str,
        executor_version: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            package: package.to_string(),
            version: version.unwrap_or_default().to_string(),
            status: AuditStatus::Error,
            message: String::new(),
            policy_version: policy_version.to_string(),
            executor_version: executor_version.unwrap_or_default().to_string(),
            start_time: now,
            end_time: now,
        }
    }

    pub fn succeed(&mut self, version: &str) {
        self.version = version.to_string();
        self.status = AuditStatus::Success;
        self.message.clear();
        self.end_time = Utc::now();
    }

    pub fn fail(&mut self, err: &ProvError) {
        self.status = AuditStatus::for_error(err);
        self.message = err.to_string();
        self.end_time = Utc::now();
    }
}
