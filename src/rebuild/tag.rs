use regex::Regex;

use crate::error::{ProvError, Result};

/// Pattern matching source tags for `version`.
///
/// An optional prefix ending in a non-digit (`v`, `release-`), the literal
/// version, then end of string or a suffix that does not start a
/// pre-release, dev, post or patch component (`a`, `b`, `d`, `p`, `-`, `.`).
pub fn tag_pattern(version: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"^(.*[^0-9])?{}([^abdp\-.].*)?$",
        regex::escape(version)
    ))
    .map_err(|e| ProvError::Internal(format!("tag pattern for '{version}': {e}")))
}

/// First tag, in listing order, that names `version`.
pub fn select_tag<'a>(tags: &'a [String], version: &str) -> Result<Option<&'a str>> {
    let re = tag_pattern(version)?;
    Ok(tags.iter().map(String::as_str).find(|t| re.is_match(t)))
}
