//! pkgprov: signed build provenance for published package releases.
//!
//! Three trust architectures produce in-toto provenance for a release:
//!
//! - **rebuild**: reproduce the published wheel from its source tag and
//!   attest when the rebuilt archive matches
//! - **build monitor**: find the CI run that uploaded the release
//! - **provenance upload**: accept statements from authorized builders
//!
//! Statements are canonicalised, wrapped in a DSSE envelope signed by an
//! external key, and stored one per package and version. Which
//! architectures apply to a package is declared in its policy file.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use pkgprov::config::Config;
//!
//! # async fn run() -> pkgprov::error::Result<()> {
//! let config = Config::load(Path::new("pkgprov.toml"))?;
//! let policies = pkgprov::load_policies(Path::new("./policies"), &config).await?;
//! println!("{} policies", policies.len());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod catalog;
pub mod ci;
pub mod config;
pub mod error;
pub mod monitor;
pub mod normalize;
pub mod output;
pub mod policy;
pub mod rebuild;
pub mod service;
pub mod signer;
pub mod source;
pub mod statement;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;

use config::Config;
use error::Result;
use policy::{PolicyDocument, PolicyStore};
use source::LocalTree;

/// Parse every policy in a checked-out policy repository.
pub async fn load_policies(root: &Path, config: &Config) -> Result<Vec<PolicyDocument>> {
    store_for(root, config)
        .fetch_all(&config.policy_repo.default_ref)
        .await
}

/// Parse one package's policy from a checked-out policy repository.
pub async fn load_policy(
    root: &Path,
    config: &Config,
    scope: &str,
    package: &str,
) -> Result<PolicyDocument> {
    store_for(root, config)
        .fetch(scope, package, &config.policy_repo.default_ref)
        .await
}

fn store_for(root: &Path, config: &Config) -> PolicyStore {
    PolicyStore::new(
        Arc::new(LocalTree::new(root)),
        config.policy_repo.dir.clone(),
    )
}

/// Apply `reference`'s archive metadata to the archive at `rebuilt`, in
/// place.
pub fn normalize_file(reference: &Path, rebuilt: &Path) -> Result<()> {
    let source = std::fs::read(reference)?;
    let dest = std::fs::read(rebuilt)?;
    let normalized = normalize::transfer_metadata(&source, &dest)?;
    std::fs::write(rebuilt, normalized)?;
    Ok(())
}
