//! Upload authorization.
//!
//! Trust boundary: the bearer token's signature is NOT verified here. The
//! platform in front of this service authenticates every request before it
//! arrives, so the token's claims are already vouched for by the time this
//! module decodes them. Do not expose these operations on a path that
//! bypasses that front end.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{ProvError, Result};
use crate::policy::PolicyDocument;

/// The caller identity asserted by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Principal {
    pub email: String,
    #[serde(rename = "sub", default)]
    pub subject: String,
}

/// Token from an `Authorization` header value.
///
/// A value with a scheme must use `Bearer`, matched case-insensitively. A
/// bare value is taken as the token only when it contains no whitespace.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| ProvError::Unauthenticated("no authorization header".into()))?;
    let header = header.trim_start();
    let token = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some((scheme, _)) => {
            return Err(ProvError::Unauthenticated(format!(
                "unsupported authorization scheme '{scheme}'"
            )))
        }
        None if header.eq_ignore_ascii_case("bearer") => "",
        None => header.trim_end(),
    };
    if token.is_empty() {
        return Err(ProvError::Unauthenticated("empty bearer token".into()));
    }
    if token.contains(char::is_whitespace) {
        return Err(ProvError::Unauthenticated("malformed bearer token".into()));
    }
    Ok(token)
}

/// Decode the claims segment of a JWT without checking its signature.
pub fn decode_unverified_claims(token: &str) -> Result<Principal> {
    let mut segments = token.split('.');
    let (Some(_header), Some(claims), Some(_signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(ProvError::Unauthenticated("token is not a JWT".into()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|e| ProvError::Unauthenticated(format!("token claims are not base64url: {e}")))?;
    let principal: Principal = serde_json::from_slice(&bytes)
        .map_err(|e| ProvError::Unauthenticated(format!("token claims: {e}")))?;
    if principal.email.is_empty() {
        return Err(ProvError::Unauthenticated("token has no email claim".into()));
    }
    Ok(principal)
}

/// Resolve the principal behind an `Authorization` header value.
pub fn authenticate(header: Option<&str>) -> Result<Principal> {
    decode_unverified_claims(bearer_token(header)?)
}

/// Allow the upload only if the principal is listed verbatim among the
/// policy's authorized builders.
pub fn authorize(policy: &PolicyDocument, principal: &Principal) -> Result<()> {
    let upload = policy.require_upload()?;
    if upload.authorized_builders.iter().any(|b| b == &principal.email) {
        Ok(())
    } else {
        tracing::info!(package = %policy.package, principal = %principal.email, "upload not authorized");
        Err(ProvError::Forbidden(format!(
            "{} may not upload provenance for {}",
            principal.email, policy.package
        )))
    }
}
