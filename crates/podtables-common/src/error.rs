//! Unified error types for the podtables workspace.
//!
//! Subprocess failures have their own error type in `podtables-runtime`
//! so callers can inspect exit codes. Everything else funnels through
//! [`PodtablesError`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PodtablesError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A namespace operation (`unshare(2)`, `setns(2)`) failed.
    #[error("namespace operation failed: {message}")]
    Namespace {
        /// Description of the failed operation.
        message: String,
    },

    /// A `mount(2)` call failed.
    #[error("mount of {source_path} onto {target} failed: {message}")]
    Mount {
        /// Mount source (empty for remounts).
        source_path: String,
        /// Mount target.
        target: PathBuf,
        /// Underlying error text.
        message: String,
    },

    /// A tool version string could not be parsed.
    #[error("invalid tool version {input:?}: {message}")]
    Version {
        /// Raw input that failed to parse.
        input: String,
        /// Why it was rejected.
        message: String,
    },

    /// The operation is not available on this platform.
    #[error("unsupported on this platform: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PodtablesError>;
