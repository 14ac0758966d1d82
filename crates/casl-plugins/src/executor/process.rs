//! Process plugins launched through `casl-sandbox`.

use std::io::Write;
use std::process::ExitStatus;
use std::thread;
use std::time::{Duration, Instant};

use casl_sandbox::{CapturedOutput, Sandbox, SandboxChild, SandboxCommand, SandboxProfile};
use tracing::{debug, warn};

use super::{Execution, ExecutionPolicy, NONINTERACTIVE_VAR, UnitOutcome};
use crate::context::PhaseContext;
use crate::protocol::{HookRequest, HookResponse, parse_response};
use crate::unit::ProcessHook;

const PROCESS_TARGET: &str = "casl_plugins::executor::process";

/// Time allowed for output readers to drain after the child exits. The wait
/// happens across polls so the coordinator thread never blocks on it.
const OUTPUT_SETTLE: Duration = Duration::from_millis(200);

/// A running process plugin.
#[derive(Debug)]
pub struct ProcessExecution {
    plugin_id: String,
    state: State,
    started: Instant,
    timeout: Option<Duration>,
    grace: Duration,
}

#[derive(Debug)]
enum State {
    Running(SandboxChild),
    Draining {
        child: SandboxChild,
        status: ExitStatus,
        deadline: Instant,
    },
    Finished(Option<UnitOutcome>),
}

impl ProcessExecution {
    /// Spawns the hook's executable and writes the request to its stdin.
    ///
    /// Launch failures produce an execution that finishes immediately.
    pub(crate) fn spawn(
        plugin_id: &str,
        hook: &ProcessHook,
        context: &PhaseContext,
        policy: &ExecutionPolicy,
        capture_limit: usize,
    ) -> Self {
        let started = Instant::now();
        let state = match Self::start(plugin_id, hook, context, policy, capture_limit) {
            Ok(child) => State::Running(child),
            Err(message) => {
                warn!(
                    target: PROCESS_TARGET,
                    plugin = plugin_id,
                    error = %message,
                    "plugin failed to start"
                );
                State::Finished(Some(UnitOutcome::failure(message, started.elapsed())))
            }
        };
        Self {
            plugin_id: plugin_id.to_owned(),
            state,
            started,
            timeout: policy.timeout,
            grace: policy.termination_grace,
        }
    }

    fn start(
        plugin_id: &str,
        hook: &ProcessHook,
        context: &PhaseContext,
        policy: &ExecutionPolicy,
        capture_limit: usize,
    ) -> Result<SandboxChild, String> {
        let line = HookRequest::for_context(context, plugin_id)
            .to_line()
            .map_err(|error| error.to_string())?;

        let mut command = SandboxCommand::new(hook.executable());
        command
            .args(hook.args())
            .current_dir(
                hook.working_dir()
                    .unwrap_or_else(|| context.workspace_root()),
            )
            .env(NONINTERACTIVE_VAR, "1");
        let profile = SandboxProfile::new()
            .with_limits(policy.effective_limits())
            .with_capture_limit(capture_limit);

        debug!(
            target: PROCESS_TARGET,
            plugin = plugin_id,
            executable = %hook.executable().display(),
            sandbox = policy.sandbox,
            "launching plugin process"
        );
        let mut child = Sandbox::new(profile)
            .spawn(command)
            .map_err(|error| format!("failed to start plugin: {error}"))?;

        if let Some(mut stdin) = child.take_stdin() {
            let plugin = plugin_id.to_owned();
            thread::spawn(move || {
                let written = stdin
                    .write_all(line.as_bytes())
                    .and_then(|()| stdin.flush());
                if let Err(error) = written {
                    debug!(
                        target: PROCESS_TARGET,
                        plugin = plugin.as_str(),
                        %error,
                        "plugin closed stdin before reading the request"
                    );
                }
            });
        }
        Ok(child)
    }

    fn take_child(&mut self) -> Option<SandboxChild> {
        match std::mem::replace(&mut self.state, State::Finished(None)) {
            State::Running(child) | State::Draining { child, .. } => Some(child),
            State::Finished(outcome) => {
                self.state = State::Finished(outcome);
                None
            }
        }
    }

    fn finish(&self, status: ExitStatus, output: &CapturedOutput) -> UnitOutcome {
        let duration = self.started.elapsed();
        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        if !stderr.trim().is_empty() {
            debug!(
                target: PROCESS_TARGET,
                plugin = self.plugin_id.as_str(),
                stderr = %stderr.trim(),
                "plugin stderr"
            );
        }
        match parse_response(&self.plugin_id, &stdout) {
            Ok(HookResponse::Success) if status.success() => UnitOutcome::success(duration),
            Ok(HookResponse::Success) => {
                UnitOutcome::failure(format!("plugin exited with {status}"), duration)
            }
            Ok(HookResponse::Failure { error }) => UnitOutcome::failure(error, duration),
            Err(error) => {
                let detail = stderr.trim();
                let message = if detail.is_empty() {
                    format!("{error} (exited with {status})")
                } else {
                    detail.to_owned()
                };
                UnitOutcome::failure(message, duration)
            }
        }
    }
}

impl Execution for ProcessExecution {
    fn poll(&mut self) -> Option<UnitOutcome> {
        let child = match &mut self.state {
            State::Running(child) => child,
            State::Draining {
                child,
                status,
                deadline,
            } => {
                if !child.output_closed() && Instant::now() < *deadline {
                    return None;
                }
                let status = *status;
                let child = self.take_child()?;
                return Some(self.finish(status, &child.into_output(Duration::ZERO)));
            }
            State::Finished(outcome) => return outcome.take(),
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                let child = self.take_child()?;
                if child.output_closed() {
                    return Some(self.finish(status, &child.into_output(Duration::ZERO)));
                }
                self.state = State::Draining {
                    child,
                    status,
                    deadline: Instant::now() + OUTPUT_SETTLE,
                };
                None
            }
            Ok(None) => {
                let timeout = self.timeout?;
                if self.started.elapsed() < timeout {
                    return None;
                }
                warn!(
                    target: PROCESS_TARGET,
                    plugin = self.plugin_id.as_str(),
                    timeout_secs = timeout.as_secs_f64(),
                    "plugin timed out, terminating"
                );
                let child = self.take_child()?;
                drop(child.terminate(self.grace));
                Some(UnitOutcome::timed_out(timeout, self.started.elapsed()))
            }
            Err(error) => {
                let child = self.take_child()?;
                drop(child.terminate(self.grace));
                Some(UnitOutcome::failure(
                    format!("failed to poll plugin process: {error}"),
                    self.started.elapsed(),
                ))
            }
        }
    }

    fn cancel(mut self: Box<Self>, reason: &str) -> UnitOutcome {
        if let Some(child) = self.take_child() {
            debug!(
                target: PROCESS_TARGET,
                plugin = self.plugin_id.as_str(),
                "terminating cancelled plugin"
            );
            drop(child.terminate(self.grace));
        }
        UnitOutcome::failure(reason, self.started.elapsed())
    }
}
