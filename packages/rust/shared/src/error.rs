//! Error types for AssetGuard.
//!
//! Library crates use [`AssetGuardError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all AssetGuard operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetGuardError {
    /// A stage tried to write a key that another write already owns.
    #[error("context key '{key}' already holds a value")]
    KeyConflict { key: String },

    /// A stage read a key nothing has written yet.
    #[error("context key '{key}' is missing")]
    MissingKey { key: String },

    /// Two parallel branches wrote the same key.
    #[error("parallel branches '{first}' and '{second}' both wrote context key '{key}'")]
    MergeConflict {
        key: String,
        first: String,
        second: String,
    },

    /// A stage failed; `source` is the original cause, unchanged.
    #[error("stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<AssetGuardError>,
    },

    /// Similarity search over an empty historical dataset.
    #[error("no historical data loaded")]
    NoHistoricalData,

    /// An asset record with a missing or out-of-domain scoring input.
    #[error("invalid asset record '{asset_id}': {reason}")]
    InvalidAssetRecord { asset_id: String, reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// An external collaborator answered, but with an error or malformed data.
    #[error("{service} error: {message}")]
    Collaborator { service: String, message: String },

    /// JSON/TOML parsing or context value shape error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad dimensions, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A task died without returning (panic or cancellation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AssetGuardError>;

impl AssetGuardError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a collaborator error for the named service.
    pub fn collaborator(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attribute this error to the stage that raised it.
    ///
    /// Failures that already name a stage, and context-store misuse (which is a
    /// wiring bug rather than a stage fault), pass through untouched.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::StageFailure { .. } | Self::KeyConflict { .. } | Self::MergeConflict { .. } => {
                self
            }
            other => Self::StageFailure {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the stage a failure originated in, if known.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AssetGuardError::config("missing CMMS password");
        assert_eq!(err.to_string(), "config error: missing CMMS password");

        let err = AssetGuardError::MergeConflict {
            key: "summary.report".into(),
            first: "work_order".into(),
            second: "summarize".into(),
        };
        assert!(err.to_string().contains("'work_order' and 'summarize'"));
    }

    #[test]
    fn in_stage_wraps_once() {
        let err = AssetGuardError::Network("timed out".into()).in_stage("detect");
        assert_eq!(err.stage(), Some("detect"));
        assert_eq!(err.to_string(), "stage 'detect' failed: network error: timed out");

        let rewrapped = err.in_stage("reactive");
        assert_eq!(rewrapped.stage(), Some("detect"));
    }

    #[test]
    fn in_stage_leaves_conflicts_alone() {
        let err = AssetGuardError::KeyConflict { key: "a".into() }.in_stage("classify");
        assert!(matches!(err, AssetGuardError::KeyConflict { .. }));
        assert_eq!(err.stage(), None);
    }
}
