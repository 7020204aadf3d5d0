use serde::Serialize;

use crate::error::Result;

/// Render any listing as pretty JSON.
pub fn render<T: Serialize + ?Sized>(items: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(items)?;
    Ok(json)
}
