//! Domain errors raised by the sandbox wrapper.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing or launching a sandboxed process.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The supplied program path was not absolute.
    #[error("sandboxed commands require absolute program paths, got {0}")]
    ProgramNotAbsolute(PathBuf),

    /// The program does not exist on the host filesystem.
    #[error("program {program} does not exist on the host filesystem")]
    MissingProgram {
        /// Path that was checked.
        program: PathBuf,
    },

    /// The working directory requested for the child does not exist.
    #[error("working directory {path} does not exist")]
    MissingWorkingDirectory {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The operating system refused to start the child process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was being launched.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A standard stream of the child could not be captured.
    #[error("failed to capture {stream} of {program}")]
    StreamUnavailable {
        /// Program that was launched.
        program: PathBuf,
        /// Name of the stream (`stdin`, `stdout` or `stderr`).
        stream: &'static str,
    },
}
