//! Resource ceilings applied to sandboxed children.

use std::fmt;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Optional resource ceilings for a sandboxed process.
///
/// Every field uses `0` to mean "do not constrain".
///
/// ```
/// use casl_sandbox::ResourceLimits;
///
/// let limits = ResourceLimits::default();
/// assert!(limits.is_unconstrained());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Address-space ceiling in megabytes.
    pub memory_mb: u64,
    /// CPU-time ceiling in seconds.
    pub cpu_seconds: u64,
    /// Maximum number of open file descriptors.
    pub open_files: u64,
    /// Maximum size of any file the process writes, in megabytes.
    pub output_mb: u64,
}

impl ResourceLimits {
    /// Returns `true` when no ceiling is configured.
    #[must_use]
    pub const fn is_unconstrained(&self) -> bool {
        self.memory_mb == 0 && self.cpu_seconds == 0 && self.open_files == 0 && self.output_mb == 0
    }

    /// Address-space ceiling in bytes, if any.
    #[must_use]
    pub const fn memory_bytes(&self) -> Option<u64> {
        megabytes_to_bytes(self.memory_mb)
    }

    /// Output file size ceiling in bytes, if any.
    #[must_use]
    pub const fn output_bytes(&self) -> Option<u64> {
        megabytes_to_bytes(self.output_mb)
    }
}

const fn megabytes_to_bytes(megabytes: u64) -> Option<u64> {
    if megabytes == 0 {
        None
    } else {
        Some(megabytes.saturating_mul(BYTES_PER_MEGABYTE))
    }
}

/// Capability that installs resource ceilings in a freshly forked child.
///
/// [`ResourceLimiter::apply`] runs between `fork` and `exec`, so
/// implementations must restrict themselves to async-signal-safe system calls
/// and must not allocate.
pub trait ResourceLimiter: Send + Sync + fmt::Debug {
    /// Applies the ceilings to the calling process.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the operating system rejects a ceiling.
    fn apply(&self, limits: &ResourceLimits) -> io::Result<()>;
}

/// Limiter that leaves the child unconstrained.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLimiter;

impl ResourceLimiter for NoopLimiter {
    fn apply(&self, _limits: &ResourceLimits) -> io::Result<()> {
        Ok(())
    }
}

/// Limiter backed by POSIX `setrlimit`.
///
/// Requested ceilings above the current hard limit are clamped to it, since an
/// unprivileged process may lower but never raise its hard limits.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixLimiter;

#[cfg(unix)]
impl ResourceLimiter for PosixLimiter {
    fn apply(&self, limits: &ResourceLimits) -> io::Result<()> {
        use nix::sys::resource::Resource;

        if let Some(bytes) = limits.memory_bytes() {
            limit_address_space(bytes)?;
        }
        if limits.cpu_seconds > 0 {
            lower_limit(Resource::RLIMIT_CPU, limits.cpu_seconds)?;
        }
        if limits.open_files > 0 {
            lower_limit(Resource::RLIMIT_NOFILE, limits.open_files)?;
        }
        if let Some(bytes) = limits.output_bytes() {
            lower_limit(Resource::RLIMIT_FSIZE, bytes)?;
        }
        Ok(())
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn limit_address_space(bytes: u64) -> io::Result<()> {
    lower_limit(nix::sys::resource::Resource::RLIMIT_AS, bytes)
}

#[cfg(all(
    unix,
    not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
))]
fn limit_address_space(_bytes: u64) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn lower_limit(resource: nix::sys::resource::Resource, value: u64) -> io::Result<()> {
    use nix::libc::rlim_t;
    use nix::sys::resource::{getrlimit, setrlimit};

    let requested = rlim_t::try_from(value).unwrap_or(rlim_t::MAX);
    let (_, hard) = getrlimit(resource).map_err(io::Error::from)?;
    let ceiling = requested.min(hard);
    setrlimit(resource, ceiling, ceiling).map_err(io::Error::from)
}

/// Returns the limiter best suited to the host platform.
#[must_use]
pub fn default_limiter() -> Arc<dyn ResourceLimiter> {
    #[cfg(unix)]
    {
        Arc::new(PosixLimiter)
    }

    #[cfg(not(unix))]
    {
        Arc::new(NoopLimiter)
    }
}
