//! Execution options shared by every plugin in a run.

use std::num::NonZeroUsize;
use std::time::Duration;

use casl_sandbox::ResourceLimits;
use serde::{Deserialize, Serialize};

use crate::env::EnvOverrides;

/// Tunables governing how plugins are executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Global switch; a disabled phase is skipped entirely.
    pub enabled: bool,
    /// Run process plugins under resource ceilings.
    pub sandbox: bool,
    /// Concurrent plugin slots. `0` selects `cpu_count - 1`.
    pub parallelism: u32,
    /// Wall-clock budget per plugin. Non-positive means unlimited.
    pub per_plugin_timeout_seconds: f64,
    /// Ceilings applied to sandboxed plugins.
    pub resource_limits: ResourceLimits,
    /// Memoise file iteration results for the duration of a run.
    pub iteration_cache: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            sandbox: true,
            parallelism: 0,
            per_plugin_timeout_seconds: 0.0,
            resource_limits: ResourceLimits::default(),
            iteration_cache: true,
        }
    }
}

impl ExecutionOptions {
    /// Number of plugins allowed to run at once.
    ///
    /// The environment override wins over the configured value; `0` falls
    /// back to one less than the available CPUs. The result is never below 1.
    ///
    /// ```
    /// use casl_config::{EnvOverrides, ExecutionOptions};
    ///
    /// let options = ExecutionOptions { parallelism: 3, ..ExecutionOptions::default() };
    /// assert_eq!(options.effective_parallelism(&EnvOverrides::default()), 3);
    /// ```
    #[must_use]
    pub fn effective_parallelism(&self, env: &EnvOverrides) -> usize {
        let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        self.parallelism_for(env, cpus)
    }

    pub(crate) fn parallelism_for(&self, env: &EnvOverrides, cpus: usize) -> usize {
        let configured = env.parallelism.unwrap_or(self.parallelism);
        let slots = if configured == 0 {
            cpus.saturating_sub(1)
        } else {
            usize::try_from(configured).unwrap_or(usize::MAX)
        };
        slots.max(1)
    }

    /// Per-plugin timeout, or `None` when unlimited.
    ///
    /// The environment value is consulted only when the configured timeout is
    /// exactly zero.
    #[must_use]
    pub fn effective_timeout(&self, env: &EnvOverrides) -> Option<Duration> {
        let configured = self.per_plugin_timeout_seconds;
        let seconds = if configured.abs() < f64::EPSILON {
            env.plugin_timeout.unwrap_or(0.0)
        } else {
            configured
        };
        if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).ok()
        } else {
            None
        }
    }
}
