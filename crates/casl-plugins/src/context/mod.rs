//! The execution context shared by every plugin of one phase run.
//!
//! A [`PhaseContext`] is built once per run and handed unchanged to every
//! hook. It exposes the workspace and artifact roots, bounded file iteration
//! with include/exclude globs, a log sink, a confirmation prompt, progress
//! reporting, and writes confined to a single directory.

mod glob;
mod sinks;

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use casl_config::{Phase, WorkspaceConfig};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub use self::sinks::{
    LogLevel, LogSink, NonInteractivePrompter, Progress, ProgressSink, Prompter, StderrLogSink,
    TracingLogSink, TracingProgressSink,
};
#[cfg(test)]
pub(crate) use self::sinks::MockPrompter;

use self::glob::GlobFilter;
use crate::error::ContextError;

const CONTEXT_TARGET: &str = "casl_plugins::context";

type CacheKey = (Vec<String>, Vec<String>);

/// Shared, read-only view of the workspace handed to plugins.
///
/// ```
/// use casl_config::{Phase, WorkspaceConfig};
/// use casl_plugins::PhaseContext;
///
/// let ctx = PhaseContext::builder(Phase::Pre, "/srv/app")
///     .config(WorkspaceConfig::default())
///     .max_files(500)
///     .build();
/// assert_eq!(ctx.write_root(), std::path::Path::new("/srv/app"));
/// ```
pub struct PhaseContext {
    phase: Phase,
    workspace_root: PathBuf,
    artifact_root: Option<PathBuf>,
    artifacts: Vec<PathBuf>,
    write_root: PathBuf,
    config: WorkspaceConfig,
    max_files: Option<usize>,
    noninteractive: bool,
    cache: Option<Mutex<HashMap<CacheKey, Vec<PathBuf>>>>,
    log: Arc<dyn LogSink>,
    prompter: Arc<dyn Prompter>,
    progress: Arc<dyn ProgressSink>,
}

impl PhaseContext {
    /// Starts building a context for `phase` rooted at `workspace_root`.
    pub fn builder(phase: Phase, workspace_root: impl Into<PathBuf>) -> PhaseContextBuilder {
        PhaseContextBuilder::new(phase, workspace_root.into())
    }

    /// Phase being run.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Directory holding build artifacts, if known.
    #[must_use]
    pub fn artifact_root(&self) -> Option<&Path> {
        self.artifact_root.as_deref()
    }

    /// Artifacts produced by the build.
    #[must_use]
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Directory [`PhaseContext::scoped_write`] is confined to.
    #[must_use]
    pub fn write_root(&self) -> &Path {
        &self.write_root
    }

    /// Workspace configuration for this phase.
    #[must_use]
    pub const fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Upper bound on the number of paths returned by one iteration.
    #[must_use]
    pub const fn max_files(&self) -> Option<usize> {
        self.max_files
    }

    /// Whether prompts resolve to their default without asking.
    #[must_use]
    pub const fn is_noninteractive(&self) -> bool {
        self.noninteractive
    }

    /// Workspace files matching the globs, sorted and bounded.
    ///
    /// Empty `include` uses the configured `file_patterns`; configured
    /// `exclude_patterns` always apply in addition to `exclude`. Results are
    /// memoised per pattern pair when the iteration cache is enabled.
    #[must_use]
    pub fn iter_files(&self, include: &[&str], exclude: &[&str]) -> Vec<PathBuf> {
        let include: Vec<String> = if include.is_empty() {
            self.config.file_patterns.clone()
        } else {
            include.iter().map(|glob| (*glob).to_owned()).collect()
        };
        let mut exclude_all = self.config.exclude_patterns.clone();
        exclude_all.extend(exclude.iter().map(|glob| (*glob).to_owned()));

        let Some(cache) = &self.cache else {
            return self.walk(&self.workspace_root, &include, &exclude_all);
        };
        let key = (include, exclude_all);
        if let Some(hit) = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }
        let files = self.walk(&self.workspace_root, &key.0, &key.1);
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, files.clone());
        files
    }

    /// Build artifacts matching the globs, sorted and bounded.
    ///
    /// Explicit artifacts are filtered by their path relative to the
    /// artifact root, or by file name when outside it. Without explicit
    /// artifacts the artifact root is walked instead.
    #[must_use]
    pub fn iter_artifacts(&self, include: &[&str], exclude: &[&str]) -> Vec<PathBuf> {
        if self.artifacts.is_empty() {
            return self
                .artifact_root
                .as_deref()
                .map(|root| self.walk(root, include, exclude))
                .unwrap_or_default();
        }
        let filter = GlobFilter::new(include, exclude);
        let mut selected: Vec<PathBuf> = self
            .artifacts
            .iter()
            .filter(|artifact| {
                let relative = self
                    .artifact_root
                    .as_deref()
                    .and_then(|root| artifact.strip_prefix(root).ok())
                    .map(slash_path)
                    .or_else(|| {
                        artifact
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                    });
                relative.is_some_and(|relative| filter.accepts(&relative))
            })
            .cloned()
            .collect();
        selected.sort();
        self.bound(selected)
    }

    /// Logs a message through the context's sink.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.log.log(level, message);
    }

    /// Logs an informational message.
    pub fn log_info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Logs a warning.
    pub fn log_warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs an error.
    pub fn log_error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Asks a yes/no question. Non-interactive contexts return `default`.
    #[must_use]
    pub fn confirm(&self, question: &str, default: bool) -> bool {
        if self.noninteractive {
            return default;
        }
        self.prompter.confirm(question, default)
    }

    /// Starts reporting progress for a long-running task.
    #[must_use]
    pub fn progress(&self, task: &str) -> Progress<'_> {
        Progress::new(self.progress.as_ref(), task)
    }

    /// Writes `contents` to `relative` under the write root.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::OutsideWriteRoot`] when `relative` is absolute
    /// or climbs out of the write root, and [`ContextError::Write`] when the
    /// filesystem refuses the write.
    pub fn scoped_write(
        &self,
        relative: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, ContextError> {
        let relative = relative.as_ref();
        let escapes = relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ContextError::OutsideWriteRoot {
                path: relative.to_path_buf(),
                root: self.write_root.clone(),
            });
        }
        let target = self.write_root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ContextError::Write {
                path: target.clone(),
                source,
            })?;
        }
        fs::write(&target, contents).map_err(|source| ContextError::Write {
            path: target.clone(),
            source,
        })?;
        debug!(target: CONTEXT_TARGET, path = %target.display(), "scoped write");
        Ok(target)
    }

    fn walk<S: AsRef<str>>(&self, root: &Path, include: &[S], exclude: &[S]) -> Vec<PathBuf> {
        let filter = GlobFilter::new(include, exclude);
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                entry
                    .path()
                    .strip_prefix(root)
                    .ok()
                    .is_none_or(|relative| !filter.prunes_dir(&slash_path(relative)))
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(target: CONTEXT_TARGET, %error, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if filter.accepts(&slash_path(relative)) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        self.bound(files)
    }

    fn bound(&self, mut files: Vec<PathBuf>) -> Vec<PathBuf> {
        if let Some(limit) = self.max_files {
            if files.len() > limit {
                warn!(
                    target: CONTEXT_TARGET,
                    found = files.len(),
                    limit,
                    "file iteration truncated"
                );
                files.truncate(limit);
            }
        }
        files
    }
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("phase", &self.phase)
            .field("workspace_root", &self.workspace_root)
            .field("artifact_root", &self.artifact_root)
            .field("artifacts", &self.artifacts.len())
            .field("write_root", &self.write_root)
            .field("noninteractive", &self.noninteractive)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PhaseContext`].
pub struct PhaseContextBuilder {
    phase: Phase,
    workspace_root: PathBuf,
    artifact_root: Option<PathBuf>,
    artifacts: Vec<PathBuf>,
    write_root: Option<PathBuf>,
    config: WorkspaceConfig,
    max_files: Option<usize>,
    noninteractive: bool,
    log: Arc<dyn LogSink>,
    prompter: Arc<dyn Prompter>,
    progress: Arc<dyn ProgressSink>,
}

impl PhaseContextBuilder {
    fn new(phase: Phase, workspace_root: PathBuf) -> Self {
        Self {
            phase,
            workspace_root,
            artifact_root: None,
            artifacts: Vec::new(),
            write_root: None,
            config: WorkspaceConfig::default(),
            max_files: None,
            noninteractive: false,
            log: Arc::new(TracingLogSink),
            prompter: Arc::new(NonInteractivePrompter),
            progress: Arc::new(TracingProgressSink),
        }
    }

    /// Sets the directory holding build artifacts.
    #[must_use]
    pub fn artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Sets the artifacts produced by the build.
    #[must_use]
    pub fn artifacts<I, P>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    /// Confines scoped writes to `root`. Defaults to the workspace root.
    #[must_use]
    pub fn write_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.write_root = Some(root.into());
        self
    }

    /// Sets the workspace configuration.
    #[must_use]
    pub fn config(mut self, config: WorkspaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Bounds every file iteration to `limit` paths.
    #[must_use]
    pub const fn max_files(mut self, limit: usize) -> Self {
        self.max_files = Some(limit);
        self
    }

    /// Resolves prompts to their default answer.
    #[must_use]
    pub const fn noninteractive(mut self, noninteractive: bool) -> Self {
        self.noninteractive = noninteractive;
        self
    }

    /// Replaces the log sink.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = sink;
        self
    }

    /// Replaces the prompter.
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Finishes the context.
    #[must_use]
    pub fn build(self) -> PhaseContext {
        let cache = self
            .config
            .options
            .iteration_cache
            .then(|| Mutex::new(HashMap::new()));
        PhaseContext {
            phase: self.phase,
            write_root: self
                .write_root
                .unwrap_or_else(|| self.workspace_root.clone()),
            workspace_root: self.workspace_root,
            artifact_root: self.artifact_root,
            artifacts: self.artifacts,
            config: self.config,
            max_files: self.max_files,
            noninteractive: self.noninteractive,
            cache,
            log: self.log,
            prompter: self.prompter,
            progress: self.progress,
        }
    }
}

impl std::fmt::Debug for PhaseContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContextBuilder")
            .field("phase", &self.phase)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
