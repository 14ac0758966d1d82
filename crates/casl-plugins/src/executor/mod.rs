//! Running one plugin unit with fault isolation.
//!
//! An executor turns a [`PluginUnit`] into a running [`Execution`] that the
//! coordinator polls without blocking. Process hooks run as sandboxed child
//! processes through `casl-sandbox`; in-process hooks run on a worker thread.
//! Every failure mode (error, panic, crash, missing response, timeout)
//! becomes a failed [`UnitOutcome`]. Nothing is returned as `Err`.

mod in_process;
mod process;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use casl_config::{EnvOverrides, ExecutionOptions};
use casl_sandbox::{DEFAULT_CAPTURE_LIMIT, ResourceLimits};

use crate::context::PhaseContext;
use crate::unit::{HookBinding, PluginUnit};

pub use self::in_process::InProcessExecution;
pub use self::process::ProcessExecution;

/// Environment variable set for process plugins; prompts must not block.
pub const NONINTERACTIVE_VAR: &str = "CASL_NONINTERACTIVE";

/// Time a terminated plugin gets before its process group is killed.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(1);

/// Interval between polls in [`PluginExecutor::execute`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Limits applied to every unit of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Wall-clock budget per unit; `None` is unlimited.
    pub timeout: Option<Duration>,
    /// Resource ceilings for sandboxed process plugins.
    pub limits: ResourceLimits,
    /// Whether process plugins run under resource ceilings.
    pub sandbox: bool,
    /// Grace period between termination and forced kill.
    pub termination_grace: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            limits: ResourceLimits::default(),
            sandbox: true,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

impl ExecutionPolicy {
    /// Derives the policy from configured options and environment overrides.
    #[must_use]
    pub fn from_options(options: &ExecutionOptions, env: &EnvOverrides) -> Self {
        Self {
            timeout: options.effective_timeout(env),
            limits: options.resource_limits,
            sandbox: options.sandbox,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    /// Sets the per-unit timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ceilings applied to a process plugin, honouring the sandbox switch.
    #[must_use]
    pub fn effective_limits(&self) -> ResourceLimits {
        if self.sandbox {
            self.limits
        } else {
            ResourceLimits::default()
        }
    }
}

/// Result of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Whether the hook returned normally.
    pub success: bool,
    /// Failure text; empty on success.
    pub error: String,
    /// Time from launch to completion.
    pub duration: Duration,
}

impl UnitOutcome {
    /// Successful outcome.
    #[must_use]
    pub const fn success(duration: Duration) -> Self {
        Self {
            success: true,
            error: String::new(),
            duration,
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            error: error.into(),
            duration,
        }
    }

    /// Timeout failure; the message always contains `timeout`.
    #[must_use]
    pub fn timed_out(timeout: Duration, duration: Duration) -> Self {
        Self::failure(
            format!("timeout after {:.1}s", timeout.as_secs_f64()),
            duration,
        )
    }
}

/// A launched unit.
pub trait Execution: Send {
    /// Returns the outcome once the unit has finished, without blocking.
    ///
    /// Timeouts are enforced here: a poll past the deadline terminates the
    /// unit and returns a timeout failure.
    fn poll(&mut self) -> Option<UnitOutcome>;

    /// Abandons the unit, returning a failure carrying `reason`.
    ///
    /// Must return promptly; process cleanup continues in the background.
    fn cancel(self: Box<Self>, reason: &str) -> UnitOutcome;
}

/// Launches plugin units.
pub trait PluginExecutor: Send + Sync {
    /// Starts `unit` against `context`.
    fn launch(
        &self,
        unit: &PluginUnit,
        context: &Arc<PhaseContext>,
        policy: &ExecutionPolicy,
    ) -> Box<dyn Execution>;

    /// Runs `unit` to completion.
    fn execute(
        &self,
        unit: &PluginUnit,
        context: &Arc<PhaseContext>,
        policy: &ExecutionPolicy,
    ) -> UnitOutcome {
        let mut execution = self.launch(unit, context, policy);
        loop {
            if let Some(outcome) = execution.poll() {
                return outcome;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Default executor: child processes for process hooks, worker threads for
/// in-process hooks.
///
/// ```no_run
/// use std::sync::Arc;
/// use casl_config::Phase;
/// use casl_plugins::{
///     ExecutionPolicy, HookBinding, PhaseContext, PluginExecutor, PluginMetadata, PluginUnit,
///     ProcessHook, SandboxedExecutor,
/// };
///
/// let unit = PluginUnit::new(
///     PluginMetadata::new("lint").expect("valid id"),
///     HookBinding::Process(ProcessHook::new("/opt/plugins/lint/run")),
/// );
/// let context = Arc::new(PhaseContext::builder(Phase::Pre, "/srv/app").build());
/// let outcome = SandboxedExecutor::new().execute(&unit, &context, &ExecutionPolicy::default());
/// println!("{} in {:?}", outcome.success, outcome.duration);
/// ```
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    capture_limit: usize,
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxedExecutor {
    /// Creates an executor keeping the last 64 KiB of each output stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Changes how many bytes of stdout and stderr are kept.
    #[must_use]
    pub const fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }
}

impl PluginExecutor for SandboxedExecutor {
    fn launch(
        &self,
        unit: &PluginUnit,
        context: &Arc<PhaseContext>,
        policy: &ExecutionPolicy,
    ) -> Box<dyn Execution> {
        match unit.hook() {
            HookBinding::Process(hook) => Box::new(ProcessExecution::spawn(
                unit.id(),
                hook,
                context,
                policy,
                self.capture_limit,
            )),
            HookBinding::InProcess(hook) => Box::new(InProcessExecution::spawn(
                unit.id(),
                Arc::clone(hook),
                Arc::clone(context),
                policy.timeout,
            )),
        }
    }
}
