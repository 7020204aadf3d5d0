//! Release Catalog: resolves a package's published versions and files.

pub mod kind;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use kind::{classify, ReleaseKind};

/// Interpreter tag of the legacy second major line; never matched.
const LEGACY_PYTHON: &str = "py2";

/// The package index (PyPI JSON API shape).
#[async_trait]
pub trait PackageIndex: Send + Sync {
    async fn project(&self, package: &str) -> Result<ProjectMetadata>;

    /// Fetch a release file by URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Project metadata as reported by the index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub info: ProjectInfo,
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<ReleaseArtifact>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Latest version.
    pub version: String,
}

/// A single published release file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
    pub filename: String,
    #[serde(rename = "packagetype", default)]
    pub package_type: String,
    #[serde(default)]
    pub python_version: String,
    pub url: String,
    #[serde(rename = "upload_time_iso_8601")]
    pub upload_time: DateTime<Utc>,
    #[serde(default)]
    pub digests: Digests,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub sha256: String,
}

impl ReleaseArtifact {
    pub fn kind(&self) -> ReleaseKind {
        classify(&self.filename)
    }

    pub fn is_legacy(&self) -> bool {
        self.python_version == LEGACY_PYTHON
    }
}

/// The files of one version of a package.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub package: String,
    pub version: String,
    pub artifacts: Vec<ReleaseArtifact>,
}

impl ResolvedVersion {
    /// Non-legacy artifacts whose kind is one of `kinds`, in index order.
    pub fn matching(&self, kinds: &[ReleaseKind]) -> Vec<&ReleaseArtifact> {
        self.artifacts
            .iter()
            .filter(|a| !a.is_legacy() && kinds.contains(&a.kind()))
            .collect()
    }

    /// Upload time of every file in this version, keyed by filename.
    pub fn upload_times(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.artifacts
            .iter()
            .map(|a| (a.filename.clone(), a.upload_time))
            .collect()
    }
}

/// Resolves versions against a `PackageIndex`.
#[derive(Clone)]
pub struct ReleaseCatalog {
    index: Arc<dyn PackageIndex>,
}

impl ReleaseCatalog {
    pub fn new(index: Arc<dyn PackageIndex>) -> Self {
        Self { index }
    }

    /// Resolve `version`, or the index's latest version when unspecified.
    ///
    /// A version the index has no files for resolves to an empty list.
    pub async fn resolve(&self, package: &str, version: Option<&str>) -> Result<ResolvedVersion> {
        let mut project = self.index.project(package).await?;
        let version = match version.filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => project.info.version.clone(),
        };
        let artifacts = project.releases.remove(&version).unwrap_or_default();
        tracing::debug!(package, version = %version, files = artifacts.len(), "resolved release");
        Ok(ResolvedVersion {
            package: package.to_string(),
            version,
            artifacts,
        })
    }

    pub async fn download(&self, artifact: &ReleaseArtifact) -> Result<Vec<u8>> {
        self.index.download(&artifact.url).await
    }
}

/// The version segment of a distribution filename
/// (`idna-3.3-py3-none-any.whl` → `3.3`).
pub fn filename_version(filename: &str) -> Option<&str> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = [".whl", ".tar.gz", ".zip"]
        .iter()
        .find_map(|ext| base.strip_suffix(ext))
        .unwrap_or(base);
    stem.split('-').nth(1).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{artifact, FakeIndex};

    fn catalog() -> ReleaseCatalog {
        let index = FakeIndex::default().with_release(
            "idna",
            "3.3",
            vec![
                artifact("idna-3.3-py3-none-any.whl", "2021-10-13T01:00:00Z"),
                artifact("idna-3.3.tar.gz", "2021-10-13T01:00:05Z"),
            ],
        );
        let mut legacy = artifact("idna-3.3-py2.py3-none-any.whl", "2021-10-13T01:00:10Z");
        legacy.python_version = "py2".into();
        let index = index.with_extra_artifact("idna", "3.3", legacy);
        ReleaseCatalog::new(Arc::new(index))
    }

    #[tokio::test]
    async fn unspecified_version_resolves_to_latest() {
        let resolved = catalog().resolve("idna", None).await.unwrap();
        assert_eq!(resolved.version, "3.3");
        assert_eq!(resolved.artifacts.len(), 3);

        let empty = catalog().resolve("idna", Some("")).await.unwrap();
        assert_eq!(empty.version, "3.3");
    }

    #[tokio::test]
    async fn unknown_version_resolves_empty() {
        let resolved = catalog().resolve("idna", Some("9.9")).await.unwrap();
        assert!(resolved.artifacts.is_empty());
        assert!(resolved.matching(&[ReleaseKind::WheelAny]).is_empty());
    }

    #[tokio::test]
    async fn matching_excludes_legacy_interpreter_builds() {
        let resolved = catalog().resolve("idna", Some("3.3")).await.unwrap();
        let wheels = resolved.matching(&[ReleaseKind::WheelAny]);
        assert_eq!(wheels.len(), 1);
        assert_eq!(wheels[0].filename, "idna-3.3-py3-none-any.whl");

        let all = resolved.matching(&[ReleaseKind::WheelAny, ReleaseKind::SourceTar]);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn parses_index_json() {
        let json = r#"{
            "info": {"version": "3.3"},
            "releases": {"3.3": [{
                "filename": "idna-3.3-py3-none-any.whl",
                "packagetype": "bdist_wheel",
                "python_version": "py3",
                "url": "https://files.example/idna-3.3-py3-none-any.whl",
                "upload_time_iso_8601": "2021-10-13T01:23:45.123456Z",
                "digests": {"md5": "abc", "sha256": "def"}
            }]}
        }"#;
        let project: ProjectMetadata = serde_json::from_str(json).unwrap();
        let file = &project.releases["3.3"][0];
        assert_eq!(file.package_type, "bdist_wheel");
        assert_eq!(file.digests.sha256, "def");
        assert_eq!(file.kind(), ReleaseKind::WheelAny);
    }

    #[test]
    fn version_from_filename() {
        assert_eq!(filename_version("idna-3.3-py3-none-any.whl"), Some("3.3"));
        assert_eq!(filename_version("dist/idna-3.3.tar.gz"), Some("3.3"));
        assert_eq!(filename_version("nodash.whl"), None);
    }
}
