//! Collaborator seams exposed to plugins through the phase context.

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const PLUGIN_LOG_TARGET: &str = "casl_plugins::plugin";

/// Severity of a plugin log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// Destination for messages logged by plugins.
pub trait LogSink: Send + Sync {
    /// Records one message.
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards plugin messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!(target: PLUGIN_LOG_TARGET, "{message}"),
            LogLevel::Warn => warn!(target: PLUGIN_LOG_TARGET, "{message}"),
            LogLevel::Error => error!(target: PLUGIN_LOG_TARGET, "{message}"),
        }
    }
}

/// Writes `[level] message` lines to standard error.
///
/// Used inside plugin processes, whose stderr the host captures.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        let mut stderr = std::io::stderr().lock();
        drop(writeln!(stderr, "[{level}] {message}"));
    }
}

/// Yes/no confirmation requested by a plugin.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter: Send + Sync {
    /// Asks `question`, returning the answer or `default` when unanswered.
    fn confirm(&self, question: &str, default: bool) -> bool;
}

/// Answers every question with its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn confirm(&self, _question: &str, default: bool) -> bool {
        default
    }
}

/// Receives progress of long-running plugin tasks.
pub trait ProgressSink: Send + Sync {
    /// Reports that `done` of `total` steps of `task` are complete.
    fn update(&self, task: &str, done: u64, total: Option<u64>, message: &str);

    /// Reports that `task` finished.
    fn finish(&self, task: &str);
}

/// Logs progress at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn update(&self, task: &str, done: u64, total: Option<u64>, message: &str) {
        tracing::debug!(target: PLUGIN_LOG_TARGET, task, done, ?total, "{message}");
    }

    fn finish(&self, task: &str) {
        tracing::debug!(target: PLUGIN_LOG_TARGET, task, "task finished");
    }
}

/// Handle for one long-running task; finishes the task when dropped.
pub struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    task: String,
    finished: bool,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, task: impl Into<String>) -> Self {
        Self {
            sink,
            task: task.into(),
            finished: false,
        }
    }

    /// Reports intermediate progress.
    pub fn update(&self, done: u64, total: Option<u64>, message: &str) {
        self.sink.update(&self.task, done, total, message);
    }

    /// Marks the task finished.
    pub fn finish(mut self) {
        self.finished = true;
        self.sink.finish(&self.task);
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.sink.finish(&self.task);
        }
    }
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("task", &self.task)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
