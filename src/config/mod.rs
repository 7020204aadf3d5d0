use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvError, Result};

/// Top-level configuration from `pkgprov.toml`.
///
/// Loaded once at process start and handed to each component by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub policy_repo: PolicyRepoConfig,
    #[serde(default)]
    pub rebuilder: RebuilderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Deployed revision, recorded in audit records.
    #[serde(default)]
    pub executor_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// CryptoKeyVersion resource name of the provenance signing key.
    #[serde(default)]
    pub key: String,
    /// Prepended to `key` to form the envelope key id.
    #[serde(default = "default_key_uri_prefix")]
    pub key_uri_prefix: String,
}

fn default_key_uri_prefix() -> String {
    "https://cloudkms.googleapis.com/".into()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            key_uri_prefix: default_key_uri_prefix(),
        }
    }
}

impl SigningConfig {
    pub fn key_id(&self) -> String {
        format!("{}{}", self.key_uri_prefix, self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRepoConfig {
    /// Directory of the policy hierarchy within the policy repository.
    #[serde(default = "default_policy_dir")]
    pub dir: String,
    /// Revision used when a request names none.
    #[serde(default = "default_ref")]
    pub default_ref: String,
}

fn default_policy_dir() -> String {
    ".".into()
}

fn default_ref() -> String {
    "main".into()
}

impl Default for PolicyRepoConfig {
    fn default() -> Self {
        Self {
            dir: default_policy_dir(),
            default_ref: default_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuilderConfig {
    /// Project that owns build resources and the normalizer image.
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_builder_image")]
    pub builder_image: String,
    /// Defaults to `gcr.io/<project>/transfer_metadata`.
    #[serde(default)]
    pub normalizer_image: Option<String>,
    /// The one interpreter minor version the build image provides.
    #[serde(default = "default_python_minor")]
    pub python_minor: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound on a single build; 0 disables the bound.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_builder_image() -> String {
    "alpine".into()
}

fn default_python_minor() -> String {
    "3.9".into()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    3600
}

impl Default for RebuilderConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            builder_image: default_builder_image(),
            normalizer_image: None,
            python_minor: default_python_minor(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl RebuilderConfig {
    pub fn normalizer_image(&self) -> String {
        self.normalizer_image
            .clone()
            .unwrap_or_else(|| format!("gcr.io/{}/transfer_metadata", self.project))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// What to do when an attestation already exists for a package+version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Replace,
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check the settings every service request depends on.
    pub fn validate(&self) -> Result<()> {
        if self.signing.key.trim().is_empty() {
            return Err(ProvError::Config("signing.key must be set".into()));
        }
        if self.rebuilder.poll_interval_secs == 0 {
            return Err(ProvError::Config(
                "rebuilder.poll_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# pkgprov configuration

[signing]
# CryptoKeyVersion resource name of the provenance signing key.
key = "projects/my-project/locations/global/keyRings/provenance/cryptoKeys/dsse/cryptoKeyVersions/1"

[policy_repo]
# Directory of the <scope>/<package>/policy.yaml hierarchy.
dir = "."
default_ref = "main"

[rebuilder]
project = "my-project"
# python_minor = "3.9"
# poll_interval_secs = 10
# Upper bound on a single rebuild, 0 disables.
# timeout_secs = 3600

[store]
# "replace" overwrites an existing attestation, "reject" refuses it.
overwrite = "replace"
"#
    }
}
