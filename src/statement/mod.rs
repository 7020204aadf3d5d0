//! in-toto provenance statements (SLSA provenance v0.1 predicate).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProvError, Result};

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v0.1";
pub const PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v0.1";

/// Builder identity of the rebuild architecture.
pub const REBUILDER_ID: &str = "https://demo.slsa.dev/rebuilder@v1";
/// Builder identity of the CI-monitoring architecture; the runner itself
/// is not observed.
pub const MONITOR_BUILDER_ID: &str =
    "https://attestations.github.com/actions-workflow/unknown-runner@v1";

pub const REBUILD_RECIPE_TYPE: &str = "https://slsa.github.com/workflow@v1";
pub const WORKFLOW_RECIPE_TYPE: &str = "https://slsa.dev/workflows/GitHubActionsWorkflow";

/// Algorithm name → hex digest.
pub type DigestSet = BTreeMap<String, String>;

pub fn digest_set(algorithm: &str, hex: impl Into<String>) -> DigestSet {
    BTreeMap::from([(algorithm.to_string(), hex.into())])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub subject: Vec<Subject>,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub digest: DigestSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub builder: Builder,
    pub recipe: Recipe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Builder {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(rename = "type")]
    pub recipe_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_in_material: Option<usize>,
    #[serde(default)]
    pub entry_point: String,
    /// Exact invocation, one shell-equivalent command per entry.
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_started_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_finished_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completeness: Completeness,
    #[serde(default)]
    pub reproducible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub arguments: bool,
    pub environment: bool,
    pub materials: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub uri: String,
    #[serde(default)]
    pub digest: DigestSet,
}

impl Statement {
    /// Build a statement, ordering subjects by name.
    pub fn new(mut subject: Vec<Subject>, predicate: Predicate) -> Self {
        subject.sort();
        Self {
            statement_type: STATEMENT_TYPE.into(),
            predicate_type: PREDICATE_TYPE.into(),
            subject,
            predicate,
        }
    }

    /// Deterministic JSON encoding (RFC 8785), the bytes that get signed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_jcs::to_vec(self)?)
    }

    /// Structural checks for statements received from callers.
    pub fn validate(&self) -> Result<()> {
        if self.statement_type != STATEMENT_TYPE {
            return Err(ProvError::BadRequest(format!(
                "unexpected statement type '{}'",
                self.statement_type
            )));
        }
        if self.predicate_type != PREDICATE_TYPE {
            return Err(ProvError::BadRequest(format!(
                "unexpected predicate type '{}'",
                self.predicate_type
            )));
        }
        if self.subject.is_empty() {
            return Err(ProvError::BadRequest("statement has no subjects".into()));
        }
        if let Some(s) = self.subject.iter().find(|s| s.digest.is_empty()) {
            return Err(ProvError::BadRequest(format!(
                "subject '{}' has no digest",
                s.name
            )));
        }
        Ok(())
    }

    pub fn subject_names(&self) -> Vec<&str> {
        self.subject.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate() -> Predicate {
        Predicate {
            builder: Builder {
                id: REBUILDER_ID.into(),
            },
            recipe: Recipe {
                recipe_type: REBUILD_RECIPE_TYPE.into(),
                defined_in_material: None,
                entry_point: "./setup.py".into(),
                arguments: vec!["git clone".into()],
                environment: vec![],
            },
            metadata: Some(Metadata {
                build_started_on: None,
                build_finished_on: None,
                completeness: Completeness {
                    arguments: true,
                    environment: false,
                    materials: false,
                },
                reproducible: false,
            }),
            materials: vec![Material {
                uri: "git+https://github.com/kjd/idna@v3.3".into(),
                digest: digest_set("sha1", "abc"),
            }],
        }
    }

    fn subject(name: &str) -> Subject {
        Subject {
            name: name.into(),
            digest: digest_set("sha256", "00"),
        }
    }

    #[test]
    fn subjects_are_sorted_by_name() {
        let stmt = Statement::new(vec![subject("b.whl"), subject("a.tar.gz"), subject("C.whl")], predicate());
        assert_eq!(stmt.subject_names(), vec!["C.whl", "a.tar.gz", "b.whl"]);
    }

    #[test]
    fn canonical_encoding_is_deterministic_and_uses_wire_names() {
        let stmt = Statement::new(vec![subject("a.whl")], predicate());
        let bytes = stmt.canonical_bytes().unwrap();
        assert_eq!(bytes, stmt.clone().canonical_bytes().unwrap());
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"_type":"https://in-toto.io/Statement/v0.1","predicate":"#));
        assert!(text.contains(r#""predicateType":"https://slsa.dev/provenance/v0.1""#));
        assert!(text.contains(r#""entryPoint":"./setup.py""#));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn parses_external_statement_and_validates() {
        let stmt = Statement::new(vec![subject("a.whl")], predicate());
        let json = serde_json::to_string(&stmt).unwrap();
        let parsed: Statement = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stmt);
        parsed.validate().unwrap();
    }

    #[test]
    fn empty_subjects_fail_validation() {
        let stmt = Statement::new(vec![], predicate());
        assert!(matches!(stmt.validate(), Err(ProvError::BadRequest(_))));
    }

    #[test]
    fn wrong_predicate_type_fails_validation() {
        let mut stmt = Statement::new(vec![subject("a.whl")], predicate());
        stmt.predicate_type = "https://example.com/other".into();
        assert!(stmt.validate().is_err());
    }
}
