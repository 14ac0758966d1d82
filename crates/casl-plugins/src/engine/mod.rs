//! Host boundary for one phase.
//!
//! [`ActionEngine`] ties discovery, configuration, registration, scheduling
//! and execution together. Hosts call [`ActionEngine::run`] (or
//! [`ActionEngine::run_async`]) with a [`RunRequest`] and receive either a
//! report or `None` when the phase was skipped.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use casl_config::{ConfigOrigin, ConfigStore, DiscoveredPlugin, EnvOverrides, Phase};
use tracing::{debug, info, warn};

use crate::context::{LogSink, PhaseContext, ProgressSink, Prompter};
use crate::coordinator::{CancelToken, ParallelCoordinator};
use crate::executor::{ExecutionPolicy, PluginExecutor, SandboxedExecutor};
use crate::loader::{Discovery, DiscoveryFailure, PluginLoader};
use crate::registry::PluginRegistry;
use crate::report::{ExecutionItem, ExecutionReport};

const ENGINE_TARGET: &str = "casl_plugins::engine";

/// What the host knows about the workspace for one run.
///
/// ```
/// use casl_plugins::RunRequest;
///
/// let request = RunRequest::new("/srv/app")
///     .artifact_root("/srv/app/dist")
///     .artifacts(["/srv/app/dist/app.tar.gz"])
///     .max_files(10_000);
/// assert!(request.workspace_root().is_some());
/// ```
#[derive(Clone, Default)]
pub struct RunRequest {
    workspace_root: Option<PathBuf>,
    artifact_root: Option<PathBuf>,
    artifacts: Vec<PathBuf>,
    write_root: Option<PathBuf>,
    max_files: Option<usize>,
    noninteractive: bool,
    log: Option<Arc<dyn LogSink>>,
    prompter: Option<Arc<dyn Prompter>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl RunRequest {
    /// Request for the workspace at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Request without a workspace; running it is always skipped.
    #[must_use]
    pub fn without_workspace() -> Self {
        Self::default()
    }

    /// Workspace root, if any.
    #[must_use]
    pub fn workspace_root(&self) -> Option<&std::path::Path> {
        self.workspace_root.as_deref()
    }

    /// Sets the build artifact directory.
    #[must_use]
    pub fn artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Sets the produced artifacts.
    #[must_use]
    pub fn artifacts<I, P>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    /// Confines scoped writes to `root`.
    #[must_use]
    pub fn write_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.write_root = Some(root.into());
        self
    }

    /// Bounds file iteration.
    #[must_use]
    pub const fn max_files(mut self, limit: usize) -> Self {
        self.max_files = Some(limit);
        self
    }

    /// Resolves prompts to their defaults.
    #[must_use]
    pub const fn noninteractive(mut self, noninteractive: bool) -> Self {
        self.noninteractive = noninteractive;
        self
    }

    /// Replaces the log sink.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = Some(sink);
        self
    }

    /// Replaces the prompter.
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn context(&self, phase: Phase, root: PathBuf, config: casl_config::WorkspaceConfig) -> PhaseContext {
        let mut builder = PhaseContext::builder(phase, root)
            .config(config)
            .artifacts(self.artifacts.iter().cloned())
            .noninteractive(self.noninteractive);
        if let Some(root) = &self.artifact_root {
            builder = builder.artifact_root(root.clone());
        }
        if let Some(root) = &self.write_root {
            builder = builder.write_root(root.clone());
        }
        if let Some(limit) = self.max_files {
            builder = builder.max_files(limit);
        }
        if let Some(sink) = &self.log {
            builder = builder.log_sink(Arc::clone(sink));
        }
        if let Some(prompter) = &self.prompter {
            builder = builder.prompter(Arc::clone(prompter));
        }
        if let Some(sink) = &self.progress {
            builder = builder.progress_sink(Arc::clone(sink));
        }
        builder.build()
    }
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("workspace_root", &self.workspace_root)
            .field("artifact_root", &self.artifact_root)
            .field("artifacts", &self.artifacts)
            .field("max_files", &self.max_files)
            .field("noninteractive", &self.noninteractive)
            .finish_non_exhaustive()
    }
}

/// Runs the plugins of one phase.
///
/// Cloning an engine is cheap; clones share loaders, executor and the
/// cancellation token.
///
/// ```no_run
/// use casl_config::Phase;
/// use casl_plugins::{ActionEngine, DirectoryLoader, RunRequest};
///
/// let engine = ActionEngine::new(Phase::Pre).with_loader(DirectoryLoader::new("/srv/plugins"));
/// if let Some(report) = engine.run(&RunRequest::new("/srv/app")) {
///     println!("{}", report.summary());
/// }
/// ```
#[derive(Clone)]
pub struct ActionEngine {
    phase: Phase,
    loaders: Vec<Arc<dyn PluginLoader>>,
    executor: Arc<dyn PluginExecutor>,
    cancel: CancelToken,
    env: EnvOverrides,
    backup: bool,
}

impl ActionEngine {
    /// Engine for `phase` with no loaders, the sandboxed executor and
    /// overrides read from the process environment.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            loaders: Vec::new(),
            executor: Arc::new(SandboxedExecutor::new()),
            cancel: CancelToken::new(),
            env: EnvOverrides::from_env(),
            backup: false,
        }
    }

    /// Adds a plugin source. Loaders are consulted in the order added.
    #[must_use]
    pub fn with_loader(mut self, loader: impl PluginLoader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    /// Replaces the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn PluginExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replaces the environment overrides.
    #[must_use]
    pub const fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    /// Keeps a backup of the configuration file when it is rewritten.
    #[must_use]
    pub const fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Shares an existing cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Phase this engine runs.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Token observed by every run of this engine.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops launching plugins in the current run. The request stays in
    /// effect until [`Self::clear_cancel`] is called.
    pub fn request_cancel(&self) {
        info!(target: ENGINE_TARGET, phase = %self.phase, "cancellation requested");
        self.cancel.cancel();
    }

    /// Clears a previous cancellation request.
    pub fn clear_cancel(&self) {
        self.cancel.reset();
    }

    /// Runs every enabled plugin of the phase.
    ///
    /// Returns `None` when the request has no usable workspace or the
    /// configuration disables the engine. Plugin failures never surface as
    /// errors; they are items of the returned report.
    #[must_use]
    pub fn run(&self, request: &RunRequest) -> Option<ExecutionReport> {
        let Some(root) = request.workspace_root.clone() else {
            info!(target: ENGINE_TARGET, phase = %self.phase, "no workspace, skipping");
            return None;
        };
        if !root.is_dir() {
            warn!(
                target: ENGINE_TARGET,
                workspace = %root.display(),
                "workspace is not a directory, skipping"
            );
            return None;
        }

        let discovery = self.discover();
        let mut failures = discovery.failures;
        let mut registry = PluginRegistry::new();
        for unit in discovery.units {
            if !unit.runs_in(self.phase) {
                debug!(target: ENGINE_TARGET, plugin = unit.id(), "not part of this phase");
                continue;
            }
            let id = unit.id().to_owned();
            if let Err(error) = registry.add(unit) {
                warn!(target: ENGINE_TARGET, plugin = id.as_str(), %error, "ignoring plugin");
                failures.push(DiscoveryFailure { plugin_id: id, error });
            }
        }

        let discovered: Vec<DiscoveredPlugin> = registry
            .iter()
            .map(|unit| DiscoveredPlugin::new(unit.id(), unit.metadata().tags().iter()))
            .chain(
                failures
                    .iter()
                    .filter(|failure| !registry.contains(&failure.plugin_id))
                    .map(|failure| DiscoveredPlugin::new(failure.plugin_id.as_str(), Vec::<String>::new())),
            )
            .collect();
        let loaded = ConfigStore::new(&root, self.phase)
            .with_backup(self.backup)
            .load(&discovered);
        if let ConfigOrigin::Fallback(error) = &loaded.origin {
            warn!(
                target: ENGINE_TARGET,
                path = %loaded.path.display(),
                %error,
                "running with default configuration"
            );
        }
        let config = loaded.config;
        if !config.options.enabled {
            info!(target: ENGINE_TARGET, phase = %self.phase, "plugins disabled by configuration");
            return None;
        }

        let ids: Vec<String> = registry.iter().map(|unit| unit.id().to_owned()).collect();
        for id in &ids {
            if !config.is_enabled(id) {
                registry.disable(id);
            }
            if let Some(priority) = config.effective_priority(id) {
                registry.set_priority(id, priority);
            }
        }

        let policy = ExecutionPolicy::from_options(&config.options, &self.env);
        let parallelism = config.options.effective_parallelism(&self.env);
        let context = Arc::new(request.context(self.phase, root, config));
        let active = registry.active_units();
        info!(
            target: ENGINE_TARGET,
            phase = %self.phase,
            plugins = active.len(),
            parallelism,
            sandbox = policy.sandbox,
            "starting plugins"
        );
        let coordinator = ParallelCoordinator::new(self.executor.as_ref(), policy, parallelism)
            .with_cancel(self.cancel.clone());
        let mut report = coordinator.run(&active, &context);
        report.prepend(
            failures
                .iter()
                .map(|failure| ExecutionItem::discovery_failure(&failure.plugin_id, &failure.error.to_string()))
                .collect(),
        );
        info!(target: ENGINE_TARGET, phase = %self.phase, ok = report.ok(), "{}", report.summary());
        Some(report)
    }

    /// Runs on a background thread and hands the result to `on_done`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised when the thread cannot be spawned.
    pub fn run_async<F>(&self, request: RunRequest, on_done: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(Option<ExecutionReport>) + Send + 'static,
    {
        let engine = self.clone();
        thread::Builder::new()
            .name(format!("casl-{}", self.phase))
            .spawn(move || on_done(engine.run(&request)))
    }

    fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        for loader in &self.loaders {
            discovery.merge(loader.discover());
        }
        debug!(
            target: ENGINE_TARGET,
            plugins = discovery.units.len(),
            failures = discovery.failures.len(),
            "discovery finished"
        );
        discovery
    }
}

impl fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEngine")
            .field("phase", &self.phase)
            .field("loaders", &self.loaders.len())
            .field("cancel", &self.cancel)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}
