//! Errors raised while reading or writing workspace configuration.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::format::ConfigFormat;

/// Failures encountered by the [`ConfigStore`](crate::ConfigStore).
///
/// None of these abort a run: a document that cannot be read or parsed is
/// replaced by defaults in memory, and a failed write leaves the previous file
/// untouched.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The document is not valid in its declared format.
    #[error("failed to parse {format} configuration {path}: {message}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Format inferred from the file extension.
        format: ConfigFormat,
        /// Parser diagnostic.
        message: String,
    },

    /// The document parsed but does not have the expected shape.
    #[error("configuration {path} has an unexpected shape: {message}")]
    Shape {
        /// File that was being decoded.
        path: PathBuf,
        /// Decoder diagnostic.
        message: String,
    },

    /// The configuration could not be rendered in the target format.
    #[error("failed to serialise configuration as {format}: {message}")]
    Serialise {
        /// Target format.
        format: ConfigFormat,
        /// Serialiser diagnostic.
        message: String,
    },

    /// Writing, backing up, or renaming the configuration file failed.
    #[error("failed to write configuration {path}: {source}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The file extension does not map to a supported format.
    #[error("unsupported configuration format for {path}")]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
