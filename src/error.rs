use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvError>;

#[derive(Error, Debug)]
pub enum ProvError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The rebuild ran to completion but its output differs from the
    /// published artifact.
    #[error("Rebuild contained diffs: {0}")]
    Inconsistent(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error ({service}): {message}")]
    Upstream { service: String, message: String },

    #[error("Build failed at step '{step}': {message}")]
    BuildFailed { step: String, message: String },

    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used at the request boundary to pick a response
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unauthenticated,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Unauthenticated | Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::BadRequest => write!(f, "bad_request"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Conflict => write!(f, "conflict"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl ProvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) | Self::Unsupported(_) => ErrorKind::BadRequest,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Inconsistent(_) | Self::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    /// Wrap a failure reported by an external service.
    pub fn upstream(service: &str, message: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}
