use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

use crate::error::{ProvError, Result};

/// Setuptools pins: releases that write `License-File` into METADATA were
/// built by the newer one.
const SETUPTOOLS_WITH_LICENSE_FILE: &str = "==58.3.0";
const SETUPTOOLS_LEGACY: &str = "==56.2.0";

static GENERATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Generator: bdist_wheel \(([.\d]*)\)").unwrap());

/// Names of the form `pkg_name-version-py3.10-nspkg.pth`.
static NSPKG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^-]+-[^-]+-py(\d+\.\d+)-nspkg\.pth$").unwrap());

/// Tool versions recovered from a published wheel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelProfile {
    /// Pin for `wheel`, e.g. `==0.37.0`.
    pub wheel: String,
    /// Pin for `setuptools`.
    pub setuptools: String,
    /// Interpreter executable, e.g. `python3.9`.
    pub python: String,
}

/// Inspect a reference wheel.
///
/// `python_minor` is the only interpreter version the build image offers;
/// a namespace-package marker naming any other version is `Unsupported`.
pub fn inspect_wheel(wheel: &[u8], python_minor: &str) -> Result<WheelProfile> {
    let mut archive = ZipArchive::new(Cursor::new(wheel))?;
    let mut metadata: Option<Vec<u8>> = None;
    let mut wheel_info: Option<Vec<u8>> = None;
    let mut python = format!("python{python_minor}");

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.ends_with(".dist-info/METADATA") {
            metadata = Some(read_entry(&mut entry)?);
        } else if name.ends_with(".dist-info/WHEEL") {
            wheel_info = Some(read_entry(&mut entry)?);
        } else if let Some(caps) = NSPKG_RE.captures(&name) {
            let version = &caps[1];
            if version != python_minor {
                return Err(ProvError::Unsupported(format!(
                    "python {version} namespace package (only {python_minor} is available)"
                )));
            }
            python = format!("python{version}");
        }
    }

    let metadata =
        metadata.ok_or_else(|| ProvError::upstream("index", "reference wheel has no METADATA"))?;
    let wheel_info =
        wheel_info.ok_or_else(|| ProvError::upstream("index", "reference wheel has no WHEEL file"))?;

    let wheel_text = String::from_utf8_lossy(&wheel_info);
    let generator = GENERATOR_RE
        .captures(&wheel_text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ProvError::Unsupported("wheel was not generated by bdist_wheel".into()))?;

    let setuptools = if contains(&metadata, b"License-File") {
        SETUPTOOLS_WITH_LICENSE_FILE
    } else {
        SETUPTOOLS_LEGACY
    };

    Ok(WheelProfile {
        wheel: format!("=={generator}"),
        setuptools: setuptools.to_string(),
        python,
    })
}

fn read_entry(entry: &mut impl Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
