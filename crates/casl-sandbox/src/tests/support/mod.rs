//! Shared fixtures for sandbox behavioural tests.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::thread::JoinHandle;
use std::time::Duration;

use tempfile::TempDir;

use crate::capture::CapturedOutput;
use crate::child::SandboxChild;
use crate::error::SandboxError;
use crate::profile::SandboxProfile;
use crate::sandbox::{Sandbox, SandboxCommand};

/// Shared state for behavioural sandbox tests.
pub struct TestWorld {
    pub profile: SandboxProfile,
    pub command: Option<SandboxCommand>,
    pub child: Option<SandboxChild>,
    pub status: Option<ExitStatus>,
    pub output: Option<CapturedOutput>,
    pub reaper: Option<JoinHandle<()>>,
    pub launch_error: Option<SandboxError>,
    pub pid: Option<u32>,
    pub temp_dir: TempDir,
    env_overrides: Vec<String>,
}

impl TestWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to allocate temporary directory");
        Self {
            profile: SandboxProfile::new(),
            command: None,
            child: None,
            status: None,
            output: None,
            reaper: None,
            launch_error: None,
            pid: None,
            temp_dir,
            env_overrides: Vec::new(),
        }
    }

    pub fn configure_shell(&mut self, script: &str) {
        let mut command = SandboxCommand::new(shell());
        command.arg("-c").arg(script);
        command.current_dir(self.temp_dir.path());
        self.command = Some(command);
    }

    pub fn configure_env_reader(&mut self) {
        let command = SandboxCommand::new(resolve_binary(&["/usr/bin/env", "/bin/env"]));
        self.command = Some(command);
    }

    pub fn set_env_var(&mut self, key: &str, value: &str) {
        // SAFETY: behavioural scenarios touching the environment use keys that
        // no other test reads, and the value is removed again on drop.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides.push(key.to_owned());
    }

    pub fn launch(&mut self) {
        let Some(command) = self.command.take() else {
            panic!("command not configured");
        };
        let sandbox = Sandbox::new(self.profile.clone());
        match sandbox.spawn(command) {
            Ok(child) => {
                self.pid = Some(child.id());
                self.child = Some(child);
            }
            Err(error) => self.launch_error = Some(error),
        }
    }

    pub fn await_child(&mut self) {
        let mut child = self.child.take().expect("child not launched");
        let status = child
            .wait()
            .unwrap_or_else(|error| panic!("failed to wait for child: {error}"));
        self.status = Some(status);
        self.output = Some(child.into_output(Duration::from_secs(1)));
    }

    pub fn terminate_child(&mut self) {
        let child = self.child.take().expect("child not launched");
        let (output, reaper) = child.terminate(Duration::from_millis(200));
        self.output = Some(output);
        self.reaper = Some(reaper);
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        for key in &self.env_overrides {
            // SAFETY: see `set_env_var`.
            unsafe { std::env::remove_var(key) };
        }
    }
}

pub fn shell() -> PathBuf {
    resolve_binary(&["/bin/sh", "/usr/bin/sh"])
}

pub fn resolve_binary(candidates: &[&str]) -> PathBuf {
    for candidate in candidates {
        let path = Path::new(candidate);
        if path.exists() {
            return path.to_path_buf();
        }
    }
    panic!("no candidate binary found in {candidates:?}");
}
