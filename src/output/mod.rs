pub mod console;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::catalog::{classify, filename_version, ReleaseKind};
use crate::error::Result;
use crate::policy::PolicyDocument;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" | "table" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One line of `classify` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub filename: String,
    pub kind: ReleaseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Classification {
    pub fn of(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            kind: classify(filename),
            version: filename_version(filename).map(str::to_string),
        }
    }
}

/// What a policy enables, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySummary {
    pub scope: String,
    pub package: String,
    pub repo: String,
    pub architectures: Vec<&'static str>,
    pub digest: String,
}

impl From<&PolicyDocument> for PolicySummary {
    fn from(doc: &PolicyDocument) -> Self {
        Self {
            scope: doc.scope.clone(),
            package: doc.package.clone(),
            repo: doc.repo.clone(),
            architectures: doc.architectures(),
            digest: doc.digest.clone(),
        }
    }
}

pub fn render_classifications(items: &[Classification], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_classifications(items)),
        OutputFormat::Json => json::render(items),
    }
}

pub fn render_policies(policies: &[PolicyDocument], format: OutputFormat) -> Result<String> {
    let summaries: Vec<PolicySummary> = policies.iter().map(PolicySummary::from).collect();
    match format {
        OutputFormat::Console => Ok(console::render_policies(&summaries)),
        OutputFormat::Json => json::render(&summaries),
    }
}
