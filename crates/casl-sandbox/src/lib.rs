//! Process isolation utilities for CASL action plugins.
//!
//! The `casl-sandbox` crate launches untrusted plugin executables as separate
//! operating system processes. Callers describe how a child should be
//! constrained using a [`SandboxProfile`], then launch it through a
//! [`Sandbox`]. Every child:
//!
//! - runs in its own process group so that termination reaches any
//!   grandchildren it spawned;
//! - has its resource ceilings applied by a [`ResourceLimiter`] before the
//!   plugin's code starts executing;
//! - has its standard output and error drained by background readers into
//!   bounded buffers so a chatty plugin can never block on a full pipe.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use casl_sandbox::{ResourceLimits, Sandbox, SandboxCommand, SandboxProfile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = SandboxProfile::new().with_limits(ResourceLimits {
//!     memory_mb: 256,
//!     ..ResourceLimits::default()
//! });
//!
//! let mut command = SandboxCommand::new("/bin/echo");
//! command.arg("hello from the sandbox");
//!
//! let sandbox = Sandbox::new(profile);
//! let mut child = sandbox.spawn(command)?;
//! let status = child.wait()?;
//! let output = child.into_output(Duration::from_millis(200));
//! assert!(status.success());
//! assert_eq!(output.stdout_lossy(), "hello from the sandbox\n");
//! # Ok(()) }
//! ```
//!
//! Resource ceilings are best-effort: on platforms without native support the
//! [`NoopLimiter`] is used and only isolation and termination are guaranteed.

mod capture;
mod child;
mod error;
mod limits;
mod profile;
mod sandbox;

pub use capture::{CapturedOutput, CapturedStream};
pub use child::SandboxChild;
pub use error::SandboxError;
pub use limits::{NoopLimiter, ResourceLimiter, ResourceLimits, default_limiter};
#[cfg(unix)]
pub use limits::PosixLimiter;
pub use profile::{DEFAULT_CAPTURE_LIMIT, EnvironmentPolicy, SandboxProfile};
pub use sandbox::{Sandbox, SandboxCommand};

#[cfg(test)]
mod tests;
