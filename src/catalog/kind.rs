use serde::{Deserialize, Serialize};

/// Packaging format of a release file, derived purely from its filename.
///
/// Source distribution formats are non-exhaustive; wheel kinds follow the
/// platform tag of PEP 425.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseKind {
    SourceZip,
    SourceTar,
    WheelAny,
    WheelManylinux,
    WheelMusllinux,
    WheelMacos,
    WheelWindows,
    Unknown,
}

impl ReleaseKind {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "source-zip" | "zip" => Some(Self::SourceZip),
            "source-tar" | "sdist" | "tar.gz" => Some(Self::SourceTar),
            "wheel-any" | "any" => Some(Self::WheelAny),
            "wheel-manylinux" | "manylinux" => Some(Self::WheelManylinux),
            "wheel-musllinux" | "musllinux" => Some(Self::WheelMusllinux),
            "wheel-macos" | "macos" => Some(Self::WheelMacos),
            "wheel-windows" | "windows" | "win" => Some(Self::WheelWindows),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn is_wheel(&self) -> bool {
        matches!(
            self,
            Self::WheelAny
                | Self::WheelManylinux
                | Self::WheelMusllinux
                | Self::WheelMacos
                | Self::WheelWindows
        )
    }
}

impl std::fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceZip => write!(f, "source-zip"),
            Self::SourceTar => write!(f, "source-tar"),
            Self::WheelAny => write!(f, "wheel-any"),
            Self::WheelManylinux => write!(f, "wheel-manylinux"),
            Self::WheelMusllinux => write!(f, "wheel-musllinux"),
            Self::WheelMacos => write!(f, "wheel-macos"),
            Self::WheelWindows => write!(f, "wheel-windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a release filename.
///
/// For wheels the platform tag is the last `-`-separated segment before
/// `.whl`, truncated at its first `.` (compressed tag sets such as
/// `manylinux1_x86_64.manylinux2010_x86_64` classify by their first tag).
pub fn classify(filename: &str) -> ReleaseKind {
    if filename.ends_with(".tar.gz") {
        return ReleaseKind::SourceTar;
    }
    if filename.ends_with(".zip") {
        return ReleaseKind::SourceZip;
    }
    let Some(stem) = filename.strip_suffix(".whl") else {
        return ReleaseKind::Unknown;
    };
    let last = stem.rsplit('-').next().unwrap_or(stem);
    let platform = last.split('.').next().unwrap_or(last);
    match platform {
        "any" => ReleaseKind::WheelAny,
        p if p.starts_with("manylinux") => ReleaseKind::WheelManylinux,
        p if p.starts_with("musllinux") => ReleaseKind::WheelMusllinux,
        p if p.starts_with("macos") => ReleaseKind::WheelMacos,
        p if p.starts_with("win") => ReleaseKind::WheelWindows,
        _ => ReleaseKind::Unknown,
    }
}
