//! Attestation and audit-record persistence.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OverwritePolicy;
use crate::error::Result;
use crate::service::audit::AuditRecord;

pub use memory::MemoryStore;

/// Collection holding signed attestations.
pub const ATTESTATIONS: &str = "attestations";
/// Audit collection for rebuild requests.
pub const REBUILDS: &str = "rebuilds";
/// Audit collection for monitor requests.
pub const MONITORS: &str = "monitors";

/// A stored attestation: the canonical statement and its envelope, both as
/// serialized JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub package: String,
    pub version: String,
    pub raw: String,
    pub dsse: String,
}

impl AttestationRecord {
    pub fn key(&self) -> String {
        attestation_key(&self.package, &self.version)
    }
}

/// One attestation per package and version.
pub fn attestation_key(package: &str, version: &str) -> String {
    format!("{package}!{version}")
}

#[async_trait]
pub trait AttestationStore: Send + Sync {
    /// Write `record` under its key. With `OverwritePolicy::Reject` an
    /// existing record is left untouched and `Conflict` is returned.
    async fn put_attestation(&self, record: AttestationRecord, overwrite: OverwritePolicy)
        -> Result<()>;

    async fn get_attestation(&self, package: &str, version: &str)
        -> Result<Option<AttestationRecord>>;

    async fn append_audit(&self, collection: &str, record: AuditRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_package_and_version() {
        let record = AttestationRecord {
            package: "idna".into(),
            version: "3.3".into(),
            raw: "{}".into(),
            dsse: "{}".into(),
        };
        assert_eq!(record.key(), "idna!3.3");
    }
}
