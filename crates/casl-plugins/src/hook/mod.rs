//! In-process action hooks.

use std::fmt;

use crate::context::PhaseContext;
use crate::error::HookError;

/// Entry point of an in-process plugin.
///
/// Hooks receive the shared phase context and report failure by returning
/// [`HookError`]. A panic is caught and recorded as a failure as well.
pub trait ActionHook: Send + Sync {
    /// Runs the plugin against the phase context.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] when the plugin fails.
    fn run(&self, context: &PhaseContext) -> Result<(), HookError>;
}

/// Adapts a closure into an [`ActionHook`].
///
/// ```
/// use casl_plugins::{FnHook, HookError};
///
/// let hook = FnHook::new(|ctx| {
///     ctx.log_info("checking");
///     Ok::<(), HookError>(())
/// });
/// # let _ = hook;
/// ```
pub struct FnHook<F> {
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(&PhaseContext) -> Result<(), HookError> + Send + Sync,
{
    /// Wraps the closure.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ActionHook for FnHook<F>
where
    F: Fn(&PhaseContext) -> Result<(), HookError> + Send + Sync,
{
    fn run(&self, context: &PhaseContext) -> Result<(), HookError> {
        (self.func)(context)
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").finish_non_exhaustive()
    }
}
