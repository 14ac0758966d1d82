//! Phase-scoped plugin orchestration for CASL.
//!
//! The `casl-plugins` crate runs third-party action plugins at two fixed
//! points around a build: the pre-build phase and the post-build phase. A run
//! discovers plugin units, resolves a deterministic order under `requires`
//! edges and priorities, executes each unit with fault isolation, and
//! returns an [`ExecutionReport`].
//!
//! # Architecture
//!
//! - [`PluginLoader`]s discover [`PluginUnit`]s. [`DirectoryLoader`] reads
//!   `plugin.toml` manifests for process plugins; [`StaticLoader`] serves
//!   in-process [`ActionHook`]s.
//! - [`PluginRegistry`] stores the units of one run.
//! - [`DependencyScheduler`] orders the active units with Kahn's algorithm,
//!   breaking ties by `(priority, insertion_index, id)` and appending cyclic
//!   remainders in key order.
//! - [`SandboxedExecutor`] runs one unit: process plugins in their own
//!   process group under [`casl_sandbox`] resource ceilings, in-process hooks
//!   on a worker thread.
//! - [`ParallelCoordinator`] drains the dependency graph with bounded
//!   concurrency and is the only writer of the report.
//! - [`ActionEngine`] is the host boundary: `run`, `run_async` and
//!   `request_cancel`.
//!
//! # Example
//!
//! ```no_run
//! use casl_config::Phase;
//! use casl_plugins::{ActionEngine, DirectoryLoader, RunRequest};
//!
//! let engine = ActionEngine::new(Phase::Post).with_loader(DirectoryLoader::new("/srv/plugins"));
//! let request = RunRequest::new("/srv/app").artifact_root("/srv/app/dist");
//! match engine.run(&request) {
//!     Some(report) if !report.ok() => eprintln!("{}", report.summary()),
//!     Some(_) => {}
//!     None => eprintln!("post-build plugins skipped"),
//! }
//! ```

pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hook;
pub mod loader;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod unit;

#[cfg(test)]
mod tests;

pub use self::context::{
    LogLevel, LogSink, NonInteractivePrompter, PhaseContext, PhaseContextBuilder, Progress,
    ProgressSink, Prompter, StderrLogSink, TracingLogSink, TracingProgressSink,
};
pub use self::coordinator::{CancelToken, ParallelCoordinator, UnitState};
pub use self::engine::{ActionEngine, RunRequest};
pub use self::error::{ContextError, HookError, PluginError};
pub use self::executor::{
    Execution, ExecutionPolicy, NONINTERACTIVE_VAR, PluginExecutor, SandboxedExecutor, UnitOutcome,
};
pub use self::hook::{ActionHook, FnHook};
pub use self::loader::{DirectoryLoader, Discovery, DiscoveryFailure, PluginLoader, StaticLoader};
pub use self::manifest::{MANIFEST_FILE, PluginManifest};
pub use self::protocol::{HookRequest, HookResponse};
pub use self::registry::{PluginRegistry, RegistryEntry};
pub use self::report::{ExecutionItem, ExecutionReport};
pub use self::scheduler::{DependencyGraph, DependencyScheduler, ReadyQueue, Schedule, ScheduleKey};
pub use self::unit::{DEFAULT_PRIORITY, HookBinding, PluginMetadata, PluginUnit, ProcessHook};
