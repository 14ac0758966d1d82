//! Sandbox orchestration on top of `std::process`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::capture::StreamCapture;
use crate::child::SandboxChild;
use crate::error::SandboxError;
use crate::profile::{EnvironmentPolicy, SandboxProfile};

/// Tracing target for sandbox launches.
const SANDBOX_TARGET: &str = "casl_sandbox::sandbox";

/// Builder for sandboxed commands.
///
/// Standard streams are always piped: stdin is handed to the caller and
/// stdout/stderr are drained into bounded buffers.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: BTreeMap<OsString, OsString>,
}

impl SandboxCommand {
    /// Creates a command for the given absolute program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: BTreeMap::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the child.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets an environment variable regardless of the profile's policy.
    pub fn env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// Program path.
    #[must_use]
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

/// Launches commands as isolated child processes.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    profile: SandboxProfile,
}

impl Sandbox {
    /// Creates a sandbox with the supplied profile.
    #[must_use]
    pub const fn new(profile: SandboxProfile) -> Self {
        Self { profile }
    }

    /// Profile applied to every launch.
    #[must_use]
    pub const fn profile(&self) -> &SandboxProfile {
        &self.profile
    }

    /// Spawns the provided command inside the configured sandbox.
    ///
    /// The child is placed in a new process group and the profile's
    /// resource ceilings are installed before the program is executed.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] when the program path is relative or missing,
    /// the working directory is missing, or the operating system refuses to
    /// start the process.
    pub fn spawn(&self, command: SandboxCommand) -> Result<SandboxChild, SandboxError> {
        let program = Self::checked_program(&command.program)?;
        if let Some(dir) = &command.current_dir {
            if !dir.is_dir() {
                return Err(SandboxError::MissingWorkingDirectory { path: dir.clone() });
            }
        }

        let mut process = Command::new(&program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }
        self.apply_environment(&mut process);
        process.envs(&command.envs);
        self.isolate(&mut process);

        debug!(
            target: SANDBOX_TARGET,
            program = %program.display(),
            limits = ?self.profile.limits(),
            "spawning sandboxed process"
        );

        let mut child = process.spawn().map_err(|source| SandboxError::Spawn {
            program: program.clone(),
            source,
        })?;

        let limit = self.profile.capture_limit();
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::StreamUnavailable {
                program: program.clone(),
                stream: "stdout",
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::StreamUnavailable {
                program: program.clone(),
                stream: "stderr",
            })?;

        Ok(SandboxChild::new(
            program,
            child,
            stdin,
            StreamCapture::spawn(stdout, limit),
            StreamCapture::spawn(stderr, limit),
        ))
    }

    fn apply_environment(&self, process: &mut Command) {
        match self.profile.environment_policy() {
            EnvironmentPolicy::InheritAll => {}
            EnvironmentPolicy::Isolated => {
                process.env_clear();
            }
            EnvironmentPolicy::AllowList(keys) => {
                process.env_clear();
                for key in keys {
                    if let Some(value) = std::env::var_os(key) {
                        process.env(key, value);
                    }
                }
            }
        }
    }

    #[cfg(unix)]
    fn isolate(&self, process: &mut Command) {
        use std::os::unix::process::CommandExt;

        let limits = self.profile.limits();
        let limiter = self.profile.limiter();
        process.process_group(0);
        if limits.is_unconstrained() {
            return;
        }
        // SAFETY: the closure runs between fork and exec; it only issues
        // getrlimit/setrlimit system calls and does not allocate.
        unsafe {
            process.pre_exec(move || limiter.apply(&limits));
        }
    }

    #[cfg(not(unix))]
    fn isolate(&self, _process: &mut Command) {}

    fn checked_program(program: &Path) -> Result<PathBuf, SandboxError> {
        if !program.is_absolute() {
            return Err(SandboxError::ProgramNotAbsolute(program.to_path_buf()));
        }
        if !program.exists() {
            return Err(SandboxError::MissingProgram {
                program: program.to_path_buf(),
            });
        }
        Ok(program.to_path_buf())
    }
}
