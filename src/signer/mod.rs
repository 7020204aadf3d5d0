//! DSSE envelopes over canonical provenance statements.
//!
//! The signature never covers the raw payload. It covers the
//! pre-authentication encoding (PAE) of the payload type and the
//! base64-encoded payload:
//!
//! ```text
//! DSSEv1 <len(type)> <type> <len(b64 payload)> <b64 payload>
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::SigningConfig;
use crate::error::{ProvError, Result};
use crate::statement::Statement;

pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

const PAE_TAG: &str = "DSSEv1";

/// External asymmetric signer holding the private key.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Sign `data` with the key version named by `key`.
    async fn asymmetric_sign(&self, key: &str, data: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload_type: String,
    /// Base64 (standard alphabet) payload.
    pub payload: String,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    /// Base64 signature bytes.
    pub sig: String,
}

/// Pre-authentication encoding of an already base64-encoded payload.
pub fn pae(payload_type: &str, encoded_payload: &str) -> Vec<u8> {
    format!(
        "{PAE_TAG} {} {payload_type} {} {encoded_payload}",
        payload_type.len(),
        encoded_payload.len()
    )
    .into_bytes()
}

impl Envelope {
    /// The bytes the signatures were computed over.
    pub fn pae(&self) -> Vec<u8> {
        pae(&self.payload_type, &self.payload)
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.payload)
            .map_err(|e| ProvError::BadRequest(format!("envelope payload is not base64: {e}")))
    }
}

/// Signs provenance with one configured key.
#[derive(Clone)]
pub struct AttestationSigner {
    kms: Arc<dyn KeyManagement>,
    key: String,
    key_id: String,
}

impl AttestationSigner {
    pub fn new(kms: Arc<dyn KeyManagement>, config: &SigningConfig) -> Self {
        Self {
            kms,
            key: config.key.clone(),
            key_id: config.key_id(),
        }
    }

    /// Wrap already-canonical payload bytes in a signed envelope.
    pub async fn sign(&self, payload: &[u8]) -> Result<Envelope> {
        let encoded = STANDARD.encode(payload);
        let signed_bytes = pae(IN_TOTO_PAYLOAD_TYPE, &encoded);
        let sig = self.kms.asymmetric_sign(&self.key, &signed_bytes).await?;
        Ok(Envelope {
            payload_type: IN_TOTO_PAYLOAD_TYPE.into(),
            payload: encoded,
            signatures: vec![Signature {
                keyid: self.key_id.clone(),
                sig: STANDARD.encode(sig),
            }],
        })
    }

    /// Canonicalise `statement` and sign it. Returns the canonical bytes
    /// alongside the envelope.
    pub async fn sign_statement(&self, statement: &Statement) -> Result<(Vec<u8>, Envelope)> {
        let canonical = statement.canonical_bytes()?;
        let envelope = self.sign(&canonical).await?;
        Ok((canonical, envelope))
    }
}
