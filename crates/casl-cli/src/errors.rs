//! Error types and exit codes for the CLI runtime.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Exit status when at least one plugin failed.
pub(crate) const EXIT_PLUGIN_FAILURE: u8 = 1;
/// Exit status for usage errors, matching clap.
pub(crate) const EXIT_USAGE: u8 = 2;
/// Exit status when the run was interrupted.
pub(crate) const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("workspace {path} is not a directory")]
    InvalidWorkspace { path: PathBuf },
    #[error("failed to install the interrupt handler: {0}")]
    Signal(io::Error),
    #[error("failed to serialise output: {0}")]
    Serialise(serde_json::Error),
    #[error("failed to write output: {0}")]
    Write(#[from] io::Error),
}

impl AppError {
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::CliUsage(_) | Self::InvalidWorkspace { .. } => ExitCode::from(EXIT_USAGE),
            _ => ExitCode::FAILURE,
        }
    }
}
