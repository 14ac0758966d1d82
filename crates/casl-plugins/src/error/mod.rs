//! Domain errors raised by plugin operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint and keep the enum `Clone`.
//!
//! Errors raised *inside* a plugin never escape the engine as [`PluginError`];
//! they are recorded as failed report items instead.

use std::path::PathBuf;
use std::sync::Arc;

use casl_sandbox::SandboxError;
use thiserror::Error;

/// Errors arising from plugin registration, discovery, and launch.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A plugin id was empty or whitespace.
    #[error("plugin id must not be empty")]
    EmptyId,

    /// A plugin with the same id is already registered.
    #[error("plugin '{id}' is already registered")]
    DuplicateId {
        /// The conflicting id.
        id: String,
    },

    /// A plugin manifest could not be read or failed validation.
    #[error("invalid manifest {path}: {message}")]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The plugin executable was not found on the filesystem.
    #[error("plugin '{id}' executable not found: {path}")]
    ExecutableNotFound {
        /// Plugin id.
        id: String,
        /// Path that was checked.
        path: PathBuf,
    },

    /// The sandbox refused to launch the plugin.
    #[error("plugin '{id}' failed to start: {source}")]
    Spawn {
        /// Plugin id.
        id: String,
        /// Underlying sandbox error.
        #[source]
        source: Arc<SandboxError>,
    },

    /// The plugin request could not be serialised to JSON.
    #[error("failed to serialise request for plugin '{id}': {message}")]
    SerializeRequest {
        /// Plugin id.
        id: String,
        /// Serialiser diagnostic.
        message: String,
    },

    /// The plugin produced output that does not conform to the protocol.
    #[error("plugin '{id}' wrote invalid output: {message}")]
    InvalidResponse {
        /// Plugin id.
        id: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// A plugin binary received a request it could not decode.
    #[error("invalid hook request: {message}")]
    InvalidRequest {
        /// Decoder diagnostic.
        message: String,
    },

    /// A plugin binary could not use its standard streams.
    #[error("hook stdio failed: {source}")]
    Stdio {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An I/O error occurred while communicating with a plugin.
    #[error("I/O error communicating with plugin '{id}': {source}")]
    Io {
        /// Plugin id.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Failure reported by an action hook.
///
/// ```
/// use casl_plugins::HookError;
///
/// let error = HookError::new("missing LICENSE");
/// assert_eq!(error.to_string(), "missing LICENSE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Creates a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for HookError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Errors raised by execution context helpers.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A scoped write targeted a path outside the allowed directory.
    #[error("path {path} escapes the writable directory {root}")]
    OutsideWriteRoot {
        /// Requested path.
        path: PathBuf,
        /// Directory writes are confined to.
        root: PathBuf,
    },

    /// Writing the file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<ContextError> for HookError {
    fn from(error: ContextError) -> Self {
        Self::new(error.to_string())
    }
}
