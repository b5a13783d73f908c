use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BatchError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Screenshot capture failed for {url} at {size}: {reason}")]
    CaptureFailed {
        url: String,
        size: String,
        reason: String,
    },

    #[error("Failed to persist {path}: {reason}")]
    PersistFailed { path: PathBuf, reason: String },

    #[error("Interrupted")]
    Interrupted,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BatchError {
    pub fn capture(url: &str, size: &str, reason: impl ToString) -> Self {
        BatchError::CaptureFailed {
            url: url.to_string(),
            size: size.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BatchError::PersistFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit status used by the CLI when a run ends with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchError::Configuration(_) | BatchError::InvalidSource(_) => 2,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BatchError {
    fn from(err: reqwest::Error) -> Self {
        BatchError::LookupFailed(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for BatchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BatchError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_message() {
        let err = BatchError::capture("https://example.com", "1024x768", "page crashed");
        assert_eq!(
            err.to_string(),
            "Screenshot capture failed for https://example.com at 1024x768: page crashed"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BatchError::InvalidSource("x".into()).exit_code(), 2);
        assert_eq!(BatchError::Interrupted.exit_code(), 1);
        assert_eq!(BatchError::Interrupted.to_string(), "Interrupted");
        assert_eq!(BatchError::persist("/tmp/a.png", "disk full").exit_code(), 1);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(BatchError::from(io), BatchError::Io(msg) if msg == "gone"));
    }
}
