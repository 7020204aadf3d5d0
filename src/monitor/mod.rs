//! Build monitor: attest to releases by finding the CI run that produced
//! them.
//!
//! A run is a candidate when some release file was uploaded strictly
//! inside the run's active window. Its archives are then searched for
//! entries that match the policy's patterns and share a name with a
//! release file uploaded inside that window; those entries become the
//! statement's subjects.
//!
//! Runs are examined in the order the CI provider lists them and the first
//! satisfying run wins. Providers that do not guarantee an order can give
//! different answers across retries.

pub mod correlate;

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::catalog::ReleaseCatalog;
use crate::ci::{CiProvider, WorkflowRun};
use crate::error::{ProvError, Result};
use crate::policy::{ArtifactSpec, GitHubActionsPolicy};
use crate::source::RepoRef;
use crate::statement::{
    digest_set, Builder, Completeness, Material, Metadata, Predicate, Recipe, Statement, Subject,
    MONITOR_BUILDER_ID, WORKFLOW_RECIPE_TYPE,
};

pub use correlate::{gate_passes, CorrelationWindow, PatternSet};

/// Correlates release uploads with CI workflow runs.
#[derive(Clone)]
pub struct BuildMonitor {
    catalog: ReleaseCatalog,
    ci: Arc<dyn CiProvider>,
}

/// Why a run produced no statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    NotTimely,
    GateFailed,
    ArtifactExpired,
    NoSubjects,
}

impl BuildMonitor {
    pub fn new(catalog: ReleaseCatalog, ci: Arc<dyn CiProvider>) -> Self {
        Self { catalog, ci }
    }

    /// Find the first run of the policy's workflow that built release files
    /// of `package`. `Ok(None)` means no run qualified.
    pub async fn monitor(
        &self,
        package: &str,
        repo: &str,
        policy: &GitHubActionsPolicy,
        version: Option<&str>,
    ) -> Result<Option<Statement>> {
        let repo = RepoRef::parse(repo)?;
        let resolved = self.catalog.resolve(package, version).await?;
        let uploads = resolved.upload_times();

        let workflows = self.ci.workflows(&repo).await?;
        let workflow = workflows
            .iter()
            .find(|w| w.name == policy.workflow)
            .ok_or_else(|| {
                ProvError::NotFound(format!("workflow '{}' in {repo}", policy.workflow))
            })?;

        let specs = policy
            .artifacts
            .iter()
            .map(|spec| PatternSet::new(&spec.patterns).map(|patterns| (spec, patterns)))
            .collect::<Result<Vec<_>>>()?;

        let runs = self.ci.runs(&repo, workflow.id).await?;
        tracing::debug!(package, version = %resolved.version, runs = runs.len(), "scanning workflow runs");

        for run in &runs {
            match self.evaluate_run(&repo, run, policy, &specs, &uploads).await? {
                Ok(subjects) => {
                    tracing::info!(package, run_id = run.id, subjects = subjects.len(), "matched workflow run");
                    return Ok(Some(statement(subjects, run, &workflow.path)));
                }
                Err(reason) => {
                    tracing::debug!(package, run_id = run.id, ?reason, "skipping run");
                }
            }
        }
        Ok(None)
    }

    async fn evaluate_run(
        &self,
        repo: &RepoRef,
        run: &WorkflowRun,
        policy: &GitHubActionsPolicy,
        specs: &[(&ArtifactSpec, PatternSet)],
        uploads: &BTreeMap<String, DateTime<Utc>>,
    ) -> Result<std::result::Result<Vec<Subject>, Skip>> {
        let window = CorrelationWindow::of(run);
        if !window.is_timely(uploads) {
            return Ok(Err(Skip::NotTimely));
        }

        if let Some(gate) = &policy.require_succeeded {
            let jobs = self.ci.jobs(repo, run.id).await?;
            if !gate_passes(&jobs, gate) {
                return Ok(Err(Skip::GateFailed));
            }
        }

        let artifacts = self.ci.artifacts(repo, run.id).await?;
        let mut subjects = Vec::new();
        for (spec, patterns) in specs {
            let Some(found) = artifacts.iter().find(|a| a.name == spec.name) else {
                tracing::debug!(run_id = run.id, artifact = %spec.name, "artifact not uploaded by run");
                continue;
            };
            if found.expired {
                tracing::info!(run_id = run.id, artifact = %spec.name, "artifact expired");
                return Ok(Err(Skip::ArtifactExpired));
            }
            let archive = self.ci.download_archive(&found.archive_download_url).await?;
            for subject in collect_subjects(&archive, patterns, &window, uploads)? {
                if subjects.iter().any(|s: &Subject| s.name == subject.name) {
                    tracing::debug!(run_id = run.id, file = %subject.name, "release file already collected from an earlier artifact");
                    continue;
                }
                subjects.push(subject);
            }
        }

        subjects.sort();
        if subjects.is_empty() {
            return Ok(Err(Skip::NoSubjects));
        }
        Ok(Ok(subjects))
    }
}

/// Hash the archive entries that are release files uploaded within `window`.
fn collect_subjects(
    archive: &[u8],
    patterns: &PatternSet,
    window: &CorrelationWindow,
    uploads: &BTreeMap<String, DateTime<Utc>>,
) -> Result<Vec<Subject>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut subjects = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if !patterns.matches(&name) {
            continue;
        }
        if !window.covers_release(&name, uploads) {
            tracing::debug!(file = %name, "entry is not a release file uploaded during the run");
            continue;
        }
        subjects.push(Subject {
            digest: digest_set("sha256", sha256_hex(&mut entry)?),
            name,
        });
    }
    Ok(subjects)
}

fn sha256_hex(reader: &mut impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    std::io::copy(reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn statement(subjects: Vec<Subject>, run: &WorkflowRun, workflow_path: &str) -> Statement {
    let predicate = Predicate {
        builder: Builder {
            id: MONITOR_BUILDER_ID.into(),
        },
        recipe: Recipe {
            recipe_type: WORKFLOW_RECIPE_TYPE.into(),
            defined_in_material: Some(0),
            entry_point: workflow_path.to_string(),
            arguments: Vec::new(),
            environment: Vec::new(),
        },
        metadata: Some(Metadata {
            build_started_on: Some(run.created_at),
            build_finished_on: Some(run.updated_at),
            completeness: Completeness::default(),
            reproducible: false,
        }),
        materials: vec![Material {
            uri: format!("git+{}@{}", run.head_repository_url, run.head_branch),
            digest: digest_set("sha1", run.head_sha.clone()),
        }],
    };
    Statement::new(subjects, predicate)
}
