//! Request-level operations: policy lookup, pipeline, signing, storage and
//! auditing, independent of any transport.

pub mod audit;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::build::BuildExecutor;
use crate::catalog::{filename_version, PackageIndex, ReleaseCatalog, ReleaseKind};
use crate::ci::CiProvider;
use crate::config::Config;
use crate::error::{ProvError, Result};
use crate::monitor::BuildMonitor;
use crate::policy::{PolicyDocument, PolicyStore};
use crate::rebuild::{RebuildOptions, Rebuilder};
use crate::signer::{AttestationSigner, Envelope, KeyManagement};
use crate::source::{FileTree, RepoRef, SourceHost};
use crate::statement::Statement;
use crate::store::{AttestationRecord, AttestationStore, MONITORS, REBUILDS};
use crate::upload;

pub use audit::{AuditRecord, AuditStatus, RequestKind};

/// External capabilities the service is built from.
#[derive(Clone)]
pub struct Capabilities {
    pub policy_tree: Arc<dyn FileTree>,
    pub index: Arc<dyn PackageIndex>,
    pub source: Arc<dyn SourceHost>,
    pub ci: Arc<dyn CiProvider>,
    pub executor: Arc<dyn BuildExecutor>,
    pub kms: Arc<dyn KeyManagement>,
    pub store: Arc<dyn AttestationStore>,
}

/// Identifies the package a request is about.
#[derive(Debug, Clone, Default)]
pub struct PackageRequest {
    pub scope: String,
    pub package: String,
    /// Latest when unset.
    pub version: Option<String>,
    /// Policy repository revision; the configured default when unset.
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub scope: String,
    pub package: String,
    pub version: String,
    /// JSON statement as submitted.
    pub provenance: String,
}

pub struct Service {
    config: Config,
    policies: PolicyStore,
    rebuilder: Rebuilder,
    monitor: BuildMonitor,
    signer: AttestationSigner,
    store: Arc<dyn AttestationStore>,
}

impl Service {
    pub fn new(config: Config, caps: Capabilities) -> Self {
        let catalog = ReleaseCatalog::new(caps.index);
        Self {
            policies: PolicyStore::new(caps.policy_tree, config.policy_repo.dir.clone()),
            rebuilder: Rebuilder::new(
                catalog.clone(),
                caps.source,
                caps.executor,
                config.rebuilder.clone(),
            ),
            monitor: BuildMonitor::new(catalog, caps.ci),
            signer: AttestationSigner::new(caps.kms, &config.signing),
            store: caps.store,
            config,
        }
    }

    /// Rebuild the requested release and store a signed attestation if it
    /// matches the published wheel.
    pub async fn rebuild(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<AttestationRecord> {
        let policy = self.fetch_policy(request).await?;
        let rebuilder_policy = policy.require_rebuilder()?;
        let mut record = self.audit_start(RequestKind::Rebuild, request, &policy);

        let outcome: Result<AttestationRecord> = async {
            let repo = RepoRef::parse(&policy.repo)?;
            let options = RebuildOptions {
                version: request.version.clone(),
                kinds: vec![ReleaseKind::WheelAny],
                package_root: rebuilder_policy.package_root.clone(),
                timeout: None,
            };
            let mut statements = self
                .rebuilder
                .rebuild(&request.package, &repo, &options, cancel)
                .await?;
            if statements.len() != 1 {
                return Err(ProvError::Internal(format!(
                    "expected one rebuilt statement, got {}",
                    statements.len()
                )));
            }
            let statement = statements.remove(0);
            let version = reconcile_version(request.version.as_deref(), &statement)?;
            self.attest(&request.package, &version, &statement).await
        }
        .await;

        self.audit_finish(REBUILDS, &mut record, &outcome).await;
        outcome
    }

    /// Find the CI run that built the requested release and store a signed
    /// attestation for it.
    pub async fn monitor(&self, request: &PackageRequest) -> Result<AttestationRecord> {
        let policy = self.fetch_policy(request).await?;
        let gha = policy.require_build_monitor()?;
        let mut record = self.audit_start(RequestKind::Monitor, request, &policy);

        let outcome: Result<AttestationRecord> = async {
            let statement = self
                .monitor
                .monitor(&request.package, &policy.repo, gha, request.version.as_deref())
                .await?
                .ok_or_else(|| ProvError::NotFound("no build found".into()))?;
            let version = reconcile_version(request.version.as_deref(), &statement)?;
            self.attest(&request.package, &version, &statement).await
        }
        .await;

        self.audit_finish(MONITORS, &mut record, &outcome).await;
        outcome
    }

    /// Sign and store provenance produced by an authorized external builder.
    ///
    /// `authorization` is the raw `Authorization` header value. See
    /// [`crate::upload`] for the trust boundary.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        authorization: Option<&str>,
    ) -> Result<AttestationRecord> {
        let principal = upload::authenticate(authorization)?;
        let policy = self
            .policies
            .fetch(
                &request.scope,
                &request.package,
                &self.config.policy_repo.default_ref,
            )
            .await?;
        upload::authorize(&policy, &principal)?;

        if request.version.trim().is_empty() {
            return Err(ProvError::BadRequest("upload requires a version".into()));
        }
        let statement: Statement = serde_json::from_str(&request.provenance)
            .map_err(|e| ProvError::BadRequest(format!("malformed provenance: {e}")))?;
        statement.validate()?;

        tracing::info!(package = %request.package, version = %request.version, principal = %principal.email, "accepted provenance upload");
        self.attest(&request.package, &request.version, &statement)
            .await
    }

    /// Fetch a stored attestation, checking it still decodes.
    pub async fn get(&self, package: &str, version: &str) -> Result<AttestationRecord> {
        let record = self
            .store
            .get_attestation(package, version)
            .await?
            .ok_or_else(|| ProvError::NotFound(format!("attestation for {package} {version}")))?;

        let statement: Statement = serde_json::from_str(&record.raw)
            .map_err(|e| ProvError::Internal(format!("stored statement is corrupt: {e}")))?;
        statement
            .canonical_bytes()
            .map_err(|e| ProvError::Internal(format!("stored statement: {e}")))?;
        serde_json::from_str::<Envelope>(&record.dsse)
            .map_err(|e| ProvError::Internal(format!("stored envelope is corrupt: {e}")))?;
        Ok(record)
    }

    async fn fetch_policy(&self, request: &PackageRequest) -> Result<PolicyDocument> {
        let reference = request
            .reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.config.policy_repo.default_ref);
        self.policies
            .fetch(&request.scope, &request.package, reference)
            .await
    }

    async fn attest(
        &self,
        package: &str,
        version: &str,
        statement: &Statement,
    ) -> Result<AttestationRecord> {
        let (canonical, envelope) = self.signer.sign_statement(statement).await?;
        let record = AttestationRecord {
            package: package.to_string(),
            version: version.to_string(),
            raw: String::from_utf8(canonical)
                .map_err(|e| ProvError::Internal(format!("canonical statement: {e}")))?,
            dsse: serde_json::to_string(&envelope)?,
        };
        self.store
            .put_attestation(record.clone(), self.config.store.overwrite)
            .await?;
        tracing::info!(package, version, "stored attestation");
        Ok(record)
    }

    fn audit_start(
        &self,
        kind: RequestKind,
        request: &PackageRequest,
        policy: &PolicyDocument,
    ) -> AuditRecord {
        AuditRecord::start(
            kind,
            &request.package,
            request.version.as_deref(),
            &policy.digest,
            self.config.executor_version.as_deref(),
        )
    }

    async fn audit_finish(
        &self,
        collection: &str,
        record: &mut AuditRecord,
        outcome: &Result<AttestationRecord>,
    ) {
        match outcome {
            Ok(stored) => record.succeed(&stored.version),
            Err(err) => {
                tracing::warn!(package = %record.package, error = %err, "request failed");
                record.fail(err);
            }
        }
        if let Err(err) = self.store.append_audit(collection, record.clone()).await {
            tracing::warn!(collection, error = %err, "failed to write audit record");
        }
    }
}

/// The version a statement attests to: the first wheel subject's, else the
/// first subject's.
pub fn built_version(statement: &Statement) -> Option<&str> {
    statement
        .subject
        .iter()
        .find(|s| s.name.ends_with(".whl"))
        .or_else(|| statement.subject.first())
        .and_then(|s| filename_version(&s.name))
}

fn reconcile_version(requested: Option<&str>, statement: &Statement) -> Result<String> {
    let built = built_version(statement);
    match (requested.filter(|v| !v.is_empty()), built) {
        (Some(requested), Some(built)) if requested != built => Err(ProvError::Internal(format!(
            "requested version {requested} differs from built version {built}"
        ))),
        (Some(requested), _) => Ok(requested.to_string()),
        (None, Some(built)) => Ok(built.to_string()),
        (None, None) => Err(ProvError::Internal(
            "cannot determine the built version".into(),
        )),
    }
}
