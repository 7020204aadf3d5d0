use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{attestation_key, AttestationRecord, AttestationStore};
use crate::config::OverwritePolicy;
use crate::error::{ProvError, Result};
use crate::service::audit::AuditRecord;

/// Process-local store, used by the CLI and in tests.
#[derive(Default)]
pub struct MemoryStore {
    attestations: Mutex<HashMap<String, AttestationRecord>>,
    audit: Mutex<BTreeMap<String, Vec<AuditRecord>>>,
}

fn poisoned<T>(_: T) -> ProvError {
    ProvError::Internal("store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit records appended to `collection`, oldest first.
    pub fn audit_records(&self, collection: &str) -> Result<Vec<AuditRecord>> {
        let audit = self.audit.lock().map_err(poisoned)?;
        Ok(audit.get(collection).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AttestationStore for MemoryStore {
    async fn put_attestation(
        &self,
        record: AttestationRecord,
        overwrite: OverwritePolicy,
    ) -> Result<()> {
        let key = record.key();
        let mut attestations = self.attestations.lock().map_err(poisoned)?;
        if overwrite == OverwritePolicy::Reject && attestations.contains_key(&key) {
            return Err(ProvError::Conflict(format!("attestation {key} already exists")));
        }
        attestations.insert(key, record);
        Ok(())
    }

    async fn get_attestation(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Option<AttestationRecord>> {
        let attestations = self.attestations.lock().map_err(poisoned)?;
        Ok(attestations.get(&attestation_key(package, version)).cloned())
    }

    async fn append_audit(&self, collection: &str, record: AuditRecord) -> Result<()> {
        let mut audit = self.audit.lock().map_err(poisoned)?;
        audit.entry(collection.to_string()).or_default().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: &str) -> AttestationRecord {
        AttestationRecord {
            package: "idna".into(),
            version: "3.3".into(),
            raw: raw.into(),
            dsse: "{}".into(),
        }
    }

    #[tokio::test]
    async fn replace_keeps_last_write() {
        let store = MemoryStore::new();
        store.put_attestation(record("first"), OverwritePolicy::Replace).await.unwrap();
        store.put_attestation(record("second"), OverwritePolicy::Replace).await.unwrap();
        let stored = store.get_attestation("idna", "3.3").await.unwrap().unwrap();
        assert_eq!(stored.raw, "second");
    }

    #[tokio::test]
    async fn reject_refuses_existing_key() {
        let store = MemoryStore::new();
        store.put_attestation(record("first"), OverwritePolicy::Reject).await.unwrap();
        let err = store
            .put_attestation(record("second"), OverwritePolicy::Reject)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvError::Conflict(_)));
        let stored = store.get_attestation("idna", "3.3").await.unwrap().unwrap();
        assert_eq!(stored.raw, "first");
    }

    #[tokio::test]
    async fn missing_attestation_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_attestation("idna", "9.9").await.unwrap().is_none());
    }
}
