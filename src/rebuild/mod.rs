//! Rebuild pipeline: reproduce a published release from source and attest
//! to it when the result matches.
//!
//! The pipeline is linear and exits at the first failure:
//!
//! 1. resolve the version and its matching release files
//! 2. pick the source tag for that version
//! 3. check the build manifest exists at the package root under that tag
//! 4. reject kinds that cannot be rebuilt yet
//! 5. per file: verify and inspect the published file, run the build job,
//!    then record provenance

pub mod inspect;
pub mod recipe;
pub mod tag;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::build::{wait_for_operation, BuildExecutor};
use crate::catalog::{ReleaseArtifact, ReleaseCatalog, ReleaseKind};
use crate::config::RebuilderConfig;
use crate::error::{ProvError, Result};
use crate::policy::digest;
use crate::source::{join_path, RepoRef, SourceHost};
use crate::statement::{
    digest_set, Builder, Completeness, Material, Metadata, Predicate, Recipe, Statement, Subject,
    REBUILDER_ID, REBUILD_RECIPE_TYPE,
};

pub use inspect::{inspect_wheel, WheelProfile};
pub use recipe::WheelRecipe;
pub use tag::{select_tag, tag_pattern};

/// Build manifest the pipeline knows how to drive.
pub const BUILD_MANIFEST: &str = "setup.py";

/// Per-request rebuild parameters.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Version to rebuild; the index's latest when `None`.
    pub version: Option<String>,
    /// Release kinds to rebuild.
    pub kinds: Vec<ReleaseKind>,
    /// Directory of the build manifest within the source repository.
    pub package_root: String,
    /// Overrides the configured per-build timeout.
    pub timeout: Option<Duration>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            version: None,
            kinds: vec![ReleaseKind::WheelAny],
            package_root: ".".into(),
            timeout: None,
        }
    }
}

impl RebuildOptions {
    fn package_root(&self) -> &str {
        let root = self.package_root.trim();
        if root.is_empty() {
            "."
        } else {
            root
        }
    }
}

/// Drives rebuilds through the external build executor.
#[derive(Clone)]
pub struct Rebuilder {
    catalog: ReleaseCatalog,
    source: Arc<dyn SourceHost>,
    executor: Arc<dyn BuildExecutor>,
    config: RebuilderConfig,
}

impl Rebuilder {
    pub fn new(
        catalog: ReleaseCatalog,
        source: Arc<dyn SourceHost>,
        executor: Arc<dyn BuildExecutor>,
        config: RebuilderConfig,
    ) -> Self {
        Self {
            catalog,
            source,
            executor,
            config,
        }
    }

    /// Rebuild every matching release file of `package` and return one
    /// statement per file.
    pub async fn rebuild(
        &self,
        package: &str,
        repo: &RepoRef,
        options: &RebuildOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Statement>> {
        let resolved = self
            .catalog
            .resolve(package, options.version.as_deref())
            .await?;
        let artifacts = resolved.matching(&options.kinds);
        if artifacts.is_empty() {
            return Err(ProvError::NotFound(format!(
                "no release files of the requested kinds for {package} {}",
                resolved.version
            )));
        }

        let tags = self.source.list_tags(repo).await?;
        let tag = select_tag(&tags, &resolved.version)?.ok_or_else(|| {
            ProvError::NotFound(format!("no tag in {repo} matches version {}", resolved.version))
        })?;
        tracing::debug!(package, version = %resolved.version, tag, "selected source tag");

        let package_root = options.package_root();
        let manifest = join_path(&[package_root, BUILD_MANIFEST]);
        if !self.source.file_exists(repo, &manifest, tag).await? {
            return Err(ProvError::NotFound(format!(
                "{BUILD_MANIFEST} not found at {package_root} in {repo}@{tag}"
            )));
        }

        if let Some(other) = artifacts.iter().find(|a| a.kind() != ReleaseKind::WheelAny) {
            return Err(ProvError::Unsupported(format!(
                "cannot rebuild {} ({})",
                other.filename,
                other.kind()
            )));
        }

        let mut statements = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            statements.push(
                self.rebuild_wheel(artifact, repo, tag, package_root, options, cancel)
                    .await?,
            );
        }
        Ok(statements)
    }

    async fn rebuild_wheel(
        &self,
        artifact: &ReleaseArtifact,
        repo: &RepoRef,
        tag: &str,
        package_root: &str,
        options: &RebuildOptions,
        cancel: &CancellationToken,
    ) -> Result<Statement> {
        let started = Utc::now();
        let reference = self.catalog.download(artifact).await?;
        let actual = digest(&reference);
        if !actual.eq_ignore_ascii_case(&artifact.digests.sha256) {
            return Err(ProvError::upstream(
                "index",
                format!(
                    "{} digest mismatch: published {}, downloaded {actual}",
                    artifact.filename, artifact.digests.sha256
                ),
            ));
        }
        let profile = inspect_wheel(&reference, &self.config.python_minor)?;

        let slug = repo.slug();
        let recipe = WheelRecipe {
            filename: &artifact.filename,
            url: &artifact.url,
            repo: &slug,
            tag,
            package_root,
            profile: &profile,
        };

        let operation = self
            .executor
            .submit(recipe.build_request(&self.config))
            .await?;
        tracing::info!(artifact = %artifact.filename, tag, operation = %operation, "rebuild submitted");

        let timeout = options.timeout.or_else(|| self.config.timeout());
        let status = wait_for_operation(
            self.executor.as_ref(),
            &operation,
            self.config.poll_interval(),
            timeout,
            cancel,
        )
        .await?;
        if let Some(error) = status.error {
            let step = error.step.unwrap_or_else(|| "unknown".into());
            if step == recipe::STEP_DIFF {
                return Err(ProvError::Inconsistent(artifact.filename.clone()));
            }
            return Err(ProvError::BuildFailed {
                step,
                message: error.message,
            });
        }

        let commit = self.source.commit_digest(repo, tag).await?;
        let finished = Utc::now();
        tracing::info!(artifact = %artifact.filename, commit = %commit, "rebuild matched");

        let predicate = Predicate {
            builder: Builder {
                id: REBUILDER_ID.into(),
            },
            recipe: Recipe {
                recipe_type: REBUILD_RECIPE_TYPE.into(),
                defined_in_material: None,
                entry_point: format!("{package_root}/{BUILD_MANIFEST}"),
                arguments: recipe.arguments(),
                environment: Vec::new(),
            },
            metadata: Some(Metadata {
                build_started_on: Some(started),
                build_finished_on: Some(finished),
                completeness: Completeness {
                    arguments: true,
                    environment: false,
                    materials: false,
                },
                reproducible: false,
            }),
            materials: vec![Material {
                uri: format!("git+{}@{tag}", repo.https_url()),
                digest: digest_set("sha1", commit),
            }],
        };
        let subject = Subject {
            name: artifact.filename.clone(),
            digest: digest_set("sha256", artifact.digests.sha256.clone()),
        };
        Ok(Statement::new(vec![subject], predicate))
    }
}
