//! Error types for CloneForge.
//!
//! Library crates use [`CloneForgeError`] via `thiserror`.
//! App crates (cli/refine) wrap this with `color-eyre` for rich diagnostics.
//!
//! "No run exists yet" is not an error: read paths return `Ok(None)` for it.
//! [`CloneForgeError::NotFound`] is reserved for mutations that require an
//! existing record.

use std::path::PathBuf;

/// Top-level error type for all CloneForge operations.
#[derive(Debug, thiserror::Error)]
pub enum CloneForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching page markup.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed input: corrupt progress JSON, unreadable snapshot line, etc.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Well-formed data that violates the expected schema or invariants.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A record required by a mutation does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Filesystem I/O error. Retryable by the caller.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CloneForgeError>;

impl CloneForgeError {
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

    /// Create a not-found error naming the missing thing.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a `serde_json` decode failure: syntax problems are parse
    /// errors, shape problems are validation errors.
    pub fn from_json(context: &str, err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Data => Self::validation(format!("{context}: {err}")),
            Category::Syntax | Category::Eof => Self::parse(format!("{context}: {err}")),
            Category::Io => Self::parse(format!("{context}: {err}")),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CloneForgeError::config("bad threshold");
        assert_eq!(err.to_string(), "config error: bad threshold");

        let err = CloneForgeError::not_found("progress record 'demo'");
        assert!(err.to_string().contains("'demo'"));
    }

    #[test]
    fn json_errors_are_classified() {
        let syntax = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        assert!(matches!(
            CloneForgeError::from_json("x", syntax),
            CloneForgeError::Parse { .. }
        ));

        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            count: u32,
        }
        let data = serde_json::from_str::<Shape>(r#"{"count": "many"}"#).unwrap_err();
        assert!(matches!(
            CloneForgeError::from_json("x", data),
            CloneForgeError::Validation { .. }
        ));
    }

    #[test]
    fn only_io_and_network_are_retryable() {
        let io = CloneForgeError::io("/tmp/x", std::io::Error::other("disk full"));
        assert!(io.is_retryable());
        assert!(!CloneForgeError::parse("broken").is_retryable());
    }
}
