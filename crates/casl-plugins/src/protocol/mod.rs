//! JSONL protocol between the host and process plugins.
//!
//! The host writes one [`HookRequest`] line to the plugin's stdin and closes
//! it. The plugin may log freely to stderr and stdout; the **last non-empty
//! stdout line** must be a [`HookResponse`]. A plugin that exits without a
//! response line has failed.
//!
//! Rust plugin binaries use [`serve_hook`] so they never handle the wire
//! format directly:
//!
//! ```no_run
//! use casl_plugins::protocol::serve_hook;
//! use casl_plugins::{FnHook, HookError, PhaseContext};
//!
//! fn main() -> std::process::ExitCode {
//!     let hook = FnHook::new(|ctx: &PhaseContext| {
//!         if ctx.workspace_root().join("LICENSE").is_file() {
//!             Ok(())
//!         } else {
//!             Err(HookError::new("LICENSE missing"))
//!         }
//!     });
//!     match serve_hook(&hook) {
//!         Ok(response) if response.is_success() => std::process::ExitCode::SUCCESS,
//!         _ => std::process::ExitCode::FAILURE,
//!     }
//! }
//! ```

use std::io::{self, BufRead, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use casl_config::{Phase, WorkspaceConfig};
use serde::{Deserialize, Serialize};

use crate::context::{NonInteractivePrompter, PhaseContext, StderrLogSink};
use crate::error::{HookError, PluginError};
use crate::hook::ActionHook;

/// Request written to a plugin's stdin as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRequest {
    /// Phase being run.
    pub phase: Phase,
    /// Id of the plugin receiving the request.
    pub plugin_id: String,
    /// Workspace root.
    pub workspace_root: PathBuf,
    /// Directory holding build artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_root: Option<PathBuf>,
    /// Artifacts produced by the build.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    /// Directory scoped writes are confined to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_root: Option<PathBuf>,
    /// Iteration bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Workspace configuration for the phase.
    #[serde(default)]
    pub config: WorkspaceConfig,
    /// Whether prompts must resolve to their default.
    #[serde(default = "default_noninteractive")]
    pub noninteractive: bool,
}

const fn default_noninteractive() -> bool {
    true
}

impl HookRequest {
    /// Describes `context` for the plugin `plugin_id`.
    ///
    /// Process plugins cannot reach the host's prompter, so the request is
    /// always non-interactive.
    #[must_use]
    pub fn for_context(context: &PhaseContext, plugin_id: &str) -> Self {
        Self {
            phase: context.phase(),
            plugin_id: plugin_id.to_owned(),
            workspace_root: context.workspace_root().to_path_buf(),
            artifact_root: context.artifact_root().map(PathBuf::from),
            artifacts: context.artifacts().to_vec(),
            write_root: Some(context.write_root().to_path_buf()),
            max_files: context.max_files(),
            config: context.config().clone(),
            noninteractive: true,
        }
    }

    /// Rebuilds a plugin-side context that logs to stderr.
    #[must_use]
    pub fn into_context(self) -> PhaseContext {
        let mut builder = PhaseContext::builder(self.phase, self.workspace_root)
            .artifacts(self.artifacts)
            .config(self.config)
            .noninteractive(self.noninteractive)
            .log_sink(Arc::new(StderrLogSink))
            .prompter(Arc::new(NonInteractivePrompter));
        if let Some(root) = self.artifact_root {
            builder = builder.artifact_root(root);
        }
        if let Some(root) = self.write_root {
            builder = builder.write_root(root);
        }
        if let Some(limit) = self.max_files {
            builder = builder.max_files(limit);
        }
        builder.build()
    }

    /// Encodes the request as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SerializeRequest`] if encoding fails.
    pub fn to_line(&self) -> Result<String, PluginError> {
        let mut line = serde_json::to_string(self).map_err(|error| PluginError::SerializeRequest {
            id: self.plugin_id.clone(),
            message: error.to_string(),
        })?;
        line.push('\n');
        Ok(line)
    }
}

/// Outcome reported by a plugin on its last stdout line.
///
/// ```
/// use casl_plugins::protocol::HookResponse;
///
/// let line = r#"{"status":"failure","error":"unsigned binary"}"#;
/// let response: HookResponse = serde_json::from_str(line).expect("valid response");
/// assert_eq!(response.error(), Some("unsigned binary"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookResponse {
    /// The hook returned normally.
    Success,
    /// The hook failed.
    Failure {
        /// Failure message.
        error: String,
    },
}

impl HookResponse {
    /// Whether the hook succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { error } => Some(error),
        }
    }
}

impl From<Result<(), HookError>> for HookResponse {
    fn from(result: Result<(), HookError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(error) => Self::Failure {
                error: error.message().to_owned(),
            },
        }
    }
}

/// Decodes the response from a plugin's captured stdout.
///
/// # Errors
///
/// Returns [`PluginError::InvalidResponse`] when stdout has no non-empty line
/// or the last one is not a valid response.
pub fn parse_response(plugin_id: &str, stdout: &str) -> Result<HookResponse, PluginError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or_else(|| PluginError::InvalidResponse {
            id: plugin_id.to_owned(),
            message: "plugin produced no response line".to_owned(),
        })?;
    serde_json::from_str(line).map_err(|error| PluginError::InvalidResponse {
        id: plugin_id.to_owned(),
        message: error.to_string(),
    })
}

/// Serves one request on the process's stdin and stdout.
///
/// # Errors
///
/// See [`serve_hook_with`].
pub fn serve_hook(hook: &dyn ActionHook) -> Result<HookResponse, PluginError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_hook_with(stdin.lock(), stdout.lock(), hook)
}

/// Reads one request line from `reader`, runs `hook`, and writes the
/// response line to `writer`.
///
/// A panicking hook is reported as a failure response.
///
/// # Errors
///
/// Returns [`PluginError::InvalidRequest`] when the request cannot be
/// decoded and [`PluginError::Stdio`] when either stream fails.
pub fn serve_hook_with<R, W>(
    mut reader: R,
    mut writer: W,
    hook: &dyn ActionHook,
) -> Result<HookResponse, PluginError>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    reader.read_line(&mut line).map_err(stdio_error)?;
    let request: HookRequest =
        serde_json::from_str(line.trim()).map_err(|error| PluginError::InvalidRequest {
            message: error.to_string(),
        })?;
    let context = request.into_context();

    let response = match catch_unwind(AssertUnwindSafe(|| hook.run(&context))) {
        Ok(result) => HookResponse::from(result),
        Err(payload) => HookResponse::Failure {
            error: panic_message(payload.as_ref()),
        },
    };

    let encoded = serde_json::to_string(&response).map_err(|error| PluginError::InvalidRequest {
        message: error.to_string(),
    })?;
    writeln!(writer, "{encoded}").map_err(stdio_error)?;
    writer.flush().map_err(stdio_error)?;
    Ok(response)
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("plugin panicked: {detail}")
}

fn stdio_error(source: io::Error) -> PluginError {
    PluginError::Stdio {
        source: Arc::new(source),
    }
}

#[cfg(test)]
mod tests;
