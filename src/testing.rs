//! In-memory fakes for every external capability, plus archive helpers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::build::{BuildExecutor, BuildRequest, OperationError, OperationStatus};
use crate::catalog::{Digests, PackageIndex, ProjectInfo, ProjectMetadata, ReleaseArtifact};
use crate::ci::{CiArtifact, CiProvider, Job, Workflow, WorkflowRun};
use crate::error::{ProvError, Result};
use crate::signer::KeyManagement;
use crate::source::{FileTree, RepoRef, SourceHost};

#[derive(Default)]
pub struct FakeTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl FakeTree {
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl FileTree for FakeTree {
    async fn get_file(&self, path: &str, _revision: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(path).cloned())
    }

    async fn list_files(&self, root: &str, _revision: &str) -> Result<Vec<String>> {
        let prefix = format!("{root}/");
        Ok(self
            .files
            .keys()
            .filter(|p| root.is_empty() || p.starts_with(&prefix))
            .cloned()
            .collect())
    }
}

/// A release file uploaded at `uploaded` (RFC 3339).
pub fn artifact(filename: &str, uploaded: &str) -> ReleaseArtifact {
    let is_wheel = filename.ends_with(".whl");
    ReleaseArtifact {
        filename: filename.to_string(),
        package_type: (if is_wheel { "bdist_wheel" } else { "sdist" }).into(),
        python_version: (if is_wheel { "py3" } else { "source" }).into(),
        url: format!("https://files.example/packages/{filename}"),
        upload_time: DateTime::parse_from_rfc3339(uploaded)
            .unwrap()
            .with_timezone(&Utc),
        digests: Digests {
            md5: String::new(),
            sha256: hex::encode(Sha256::digest(filename.as_bytes())),
        },
    }
}

#[derive(Default)]
pub struct FakeIndex {
    projects: BTreeMap<String, ProjectMetadata>,
    downloads: HashMap<String, Vec<u8>>,
}

impl FakeIndex {
    /// Add a version; the last one added is reported as latest.
    pub fn with_release(mut self, package: &str, version: &str, files: Vec<ReleaseArtifact>) -> Self {
        let project = self.projects.entry(package.to_string()).or_default();
        project.info = ProjectInfo {
            version: version.to_string(),
        };
        project.releases.insert(version.to_string(), files);
        self
    }

    pub fn with_extra_artifact(mut self, package: &str, version: &str, file: ReleaseArtifact) -> Self {
        self.projects
            .entry(package.to_string())
            .or_default()
            .releases
            .entry(version.to_string())
            .or_default()
            .push(file);
        self
    }

    pub fn with_download(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.downloads.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl PackageIndex for FakeIndex {
    async fn project(&self, package: &str) -> Result<ProjectMetadata> {
        self.projects
            .get(package)
            .cloned()
            .ok_or_else(|| ProvError::NotFound(format!("project {package}")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads
            .get(url)
            .cloned()
            .ok_or_else(|| ProvError::upstream("index", format!("404 for {url}")))
    }
}

#[derive(Default)]
pub struct FakeKms {
    fail: bool,
    requests: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeKms {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The signature this fake returns for `data`.
    pub fn signature_for(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    pub fn requests(&self) -> Vec<(String, Vec<u8>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyManagement for FakeKms {
    async fn asymmetric_sign(&self, key: &str, data: &[u8]) -> Result<Vec<u8>> {
        if self.fail {
            return Err(ProvError::upstream("kms", "permission denied"));
        }
        self.requests
            .lock()
            .unwrap()
            .push((key.to_string(), data.to_vec()));
        Ok(Self::signature_for(data))
    }
}

/// Build executor whose operations complete on their n-th poll.
pub struct FakeExecutor {
    finish_after: Option<usize>,
    error: Option<OperationError>,
    submitted: Mutex<Vec<BuildRequest>>,
    polls: Mutex<HashMap<String, usize>>,
}

impl FakeExecutor {
    pub fn finishing_after(polls: usize, error: Option<OperationError>) -> Self {
        Self {
            finish_after: Some(polls.max(1)),
            error,
            submitted: Mutex::default(),
            polls: Mutex::default(),
        }
    }

    pub fn never_finishing() -> Self {
        Self {
            finish_after: None,
            error: None,
            submitted: Mutex::default(),
            polls: Mutex::default(),
        }
    }

    pub fn submitted(&self) -> Vec<BuildRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Total polls across all operations.
    pub fn polls(&self) -> usize {
        self.polls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl BuildExecutor for FakeExecutor {
    async fn submit(&self, request: BuildRequest) -> Result<String> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request);
        Ok(format!("operations/build-{}", submitted.len()))
    }

    async fn operation(&self, name: &str) -> Result<OperationStatus> {
        let mut polls = self.polls.lock().unwrap();
        let count = polls.entry(name.to_string()).or_default();
        *count += 1;
        let done = self.finish_after.is_some_and(|n| *count >= n);
        Ok(OperationStatus {
            done,
            error: if done { self.error.clone() } else { None },
        })
    }
}

#[derive(Default)]
pub struct FakeSource {
    tags: Vec<String>,
    files: HashSet<(String, String)>,
    commits: HashMap<String, String>,
}

impl FakeSource {
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_file(mut self, revision: &str, path: &str) -> Self {
        self.files.insert((revision.to_string(), path.to_string()));
        self
    }

    pub fn with_commit(mut self, reference: &str, sha: &str) -> Self {
        self.commits.insert(reference.to_string(), sha.to_string());
        self
    }
}

#[async_trait]
impl SourceHost for FakeSource {
    async fn list_tags(&self, _repo: &RepoRef) -> Result<Vec<String>> {
        Ok(self.tags.clone())
    }

    async fn commit_digest(&self, repo: &RepoRef, reference: &str) -> Result<String> {
        self.commits
            .get(reference)
            .cloned()
            .ok_or_else(|| ProvError::upstream("github", format!("no ref {reference} in {repo}")))
    }

    async fn file_exists(&self, _repo: &RepoRef, path: &str, revision: &str) -> Result<bool> {
        Ok(self
            .files
            .contains(&(revision.to_string(), path.to_string())))
    }
}

#[derive(Default)]
pub struct FakeCi {
    workflows: Vec<Workflow>,
    runs: HashMap<u64, Vec<WorkflowRun>>,
    jobs: HashMap<u64, Vec<Job>>,
    artifacts: HashMap<u64, Vec<CiArtifact>>,
    archives: HashMap<String, Vec<u8>>,
}

impl FakeCi {
    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn with_run(mut self, workflow_id: u64, run: WorkflowRun) -> Self {
        self.runs.entry(workflow_id).or_default().push(run);
        self
    }

    pub fn with_jobs(mut self, run_id: u64, jobs: Vec<Job>) -> Self {
        self.jobs.insert(run_id, jobs);
        self
    }

    pub fn with_artifact(mut self, run_id: u64, artifact: CiArtifact) -> Self {
        self.artifacts.entry(run_id).or_default().push(artifact);
        self
    }

    pub fn with_archive(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl CiProvider for FakeCi {
    async fn workflows(&self, _repo: &RepoRef) -> Result<Vec<Workflow>> {
        Ok(self.workflows.clone())
    }

    async fn runs(&self, _repo: &RepoRef, workflow_id: u64) -> Result<Vec<WorkflowRun>> {
        Ok(self.runs.get(&workflow_id).cloned().unwrap_or_default())
    }

    async fn jobs(&self, _repo: &RepoRef, run_id: u64) -> Result<Vec<Job>> {
        Ok(self.jobs.get(&run_id).cloned().unwrap_or_default())
    }

    async fn artifacts(&self, _repo: &RepoRef, run_id: u64) -> Result<Vec<CiArtifact>> {
        Ok(self.artifacts.get(&run_id).cloned().unwrap_or_default())
    }

    async fn download_archive(&self, url: &str) -> Result<Vec<u8>> {
        self.archives
            .get(url)
            .cloned()
            .ok_or_else(|| ProvError::upstream("ci", format!("404 for {url}")))
    }
}

/// A file to place in a test archive.
pub struct ZipEntry {
    name: String,
    data: Vec<u8>,
    date: Option<(u16, u8, u8)>,
    mode: Option<u32>,
}

impl ZipEntry {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            date: None,
            mode: None,
        }
    }

    pub fn at(mut self, year: u16, month: u8, day: u8) -> Self {
        self.date = Some((year, month, day));
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

pub fn build_zip(entries: &[ZipEntry]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some((year, month, day)) = entry.date {
            options = options.last_modified_time(
                zip::DateTime::from_date_and_time(year, month, day, 12, 0, 0).unwrap(),
            );
        }
        if let Some(mode) = entry.mode {
            options = options.unix_permissions(mode);
        }
        writer.start_file(entry.name.as_str(), options).unwrap();
        writer.write_all(&entry.data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// An archive entry as read back.
pub struct ReadEntry {
    pub name: String,
    pub year: u16,
    pub mode: Option<u32>,
    pub data: Vec<u8>,
}

pub fn read_zip(bytes: &[u8]) -> Vec<ReadEntry> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            ReadEntry {
                name: file.name().to_string(),
                year: file.last_modified().map(|d| d.year()).unwrap_or_default(),
                mode: file.unix_mode(),
                data,
            }
        })
        .collect()
}

/// A pure-Python wheel as `bdist_wheel <generator>` would produce it.
pub fn wheel_fixture(name: &str, version: &str, generator: &str, license_file: bool) -> Vec<u8> {
    let dist_info = format!("{name}-{version}.dist-info");
    let mut metadata = format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n");
    if license_file {
        metadata.push_str("License-File: LICENSE.md\n");
    }
    let wheel = format!(
        "Wheel-Version: 1.0\nGenerator: bdist_wheel ({generator})\nRoot-Is-Purelib: true\nTag: py3-none-any\n"
    );
    build_zip(&[
        ZipEntry::new(&format!("{name}/__init__.py"), b"__version__ = '0'\n"),
        ZipEntry::new(&format!("{dist_info}/METADATA"), metadata.as_bytes()),
        ZipEntry::new(&format!("{dist_info}/WHEEL"), wheel.as_bytes()),
        ZipEntry::new(&format!("{dist_info}/RECORD"), b""),
    ])
}

/// An unsigned JWT carrying `claims` (a JSON object).
pub fn jwt(claims: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims),
        URL_SAFE_NO_PAD.encode(b"not-a-signature")
    )
}
