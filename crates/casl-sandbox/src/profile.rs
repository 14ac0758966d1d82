//! Sandbox policy definition and builder helpers.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::limits::{ResourceLimiter, ResourceLimits, default_limiter};

/// Default number of bytes retained from each captured output stream.
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

/// Environment inheritance strategy applied to sandboxed processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentPolicy {
    /// Remove all environment variables before launching the child.
    Isolated,
    /// Allow only the named environment variables to be inherited.
    AllowList(BTreeSet<String>),
    /// Inherit the full environment unchanged.
    #[default]
    InheritAll,
}

/// Declarative description of how a sandboxed process is constrained.
///
/// The profile defaults to inheriting the host environment with no resource
/// ceilings; callers tighten it with the builder methods.
///
/// ```
/// use casl_sandbox::{EnvironmentPolicy, ResourceLimits, SandboxProfile};
///
/// let profile = SandboxProfile::new()
///     .with_limits(ResourceLimits { cpu_seconds: 5, ..ResourceLimits::default() })
///     .isolate_environment()
///     .allow_environment_variable("PATH");
/// assert_eq!(profile.limits().cpu_seconds, 5);
/// assert!(matches!(profile.environment_policy(), EnvironmentPolicy::AllowList(_)));
/// ```
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    limits: ResourceLimits,
    limiter: Arc<dyn ResourceLimiter>,
    environment: EnvironmentPolicy,
    capture_limit: usize,
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxProfile {
    /// Creates an unconstrained profile using the platform limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limits: ResourceLimits::default(),
            limiter: default_limiter(),
            environment: EnvironmentPolicy::default(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Sets the resource ceilings applied before the child executes.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the limiter used to install resource ceilings.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<dyn ResourceLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Caps the number of bytes retained from stdout and stderr.
    #[must_use]
    pub const fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    /// Strips the inherited environment entirely.
    #[must_use]
    pub fn isolate_environment(mut self) -> Self {
        self.environment = EnvironmentPolicy::Isolated;
        self
    }

    /// Permits the child to inherit the named environment variable.
    ///
    /// Calling this on an inheriting profile switches it to an allow-list.
    #[must_use]
    pub fn allow_environment_variable(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        match &mut self.environment {
            EnvironmentPolicy::AllowList(keys) => {
                keys.insert(key);
            }
            EnvironmentPolicy::Isolated | EnvironmentPolicy::InheritAll => {
                self.environment = EnvironmentPolicy::AllowList(BTreeSet::from([key]));
            }
        }
        self
    }

    /// Allows the child to inherit the full environment.
    #[must_use]
    pub fn allow_full_environment(mut self) -> Self {
        self.environment = EnvironmentPolicy::InheritAll;
        self
    }

    /// Resource ceilings applied to the child.
    #[must_use]
    pub const fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Limiter installing the ceilings.
    #[must_use]
    pub fn limiter(&self) -> Arc<dyn ResourceLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Current environment policy.
    #[must_use]
    pub const fn environment_policy(&self) -> &EnvironmentPolicy {
        &self.environment
    }

    /// Maximum bytes retained per captured stream.
    #[must_use]
    pub const fn capture_limit(&self) -> usize {
        self.capture_limit
    }
}
