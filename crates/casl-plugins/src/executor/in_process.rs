//! In-process hooks on worker threads.
//!
//! Threads cannot be preempted: a hook that overruns its timeout is reported
//! as failed and abandoned, but keeps running until it returns.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::{Execution, UnitOutcome};
use crate::context::PhaseContext;
use crate::error::HookError;
use crate::hook::ActionHook;
use crate::protocol::panic_message;

const IN_PROCESS_TARGET: &str = "casl_plugins::executor::in_process";

/// A hook running on a worker thread.
#[derive(Debug)]
pub struct InProcessExecution {
    plugin_id: String,
    receiver: Option<Receiver<Result<(), String>>>,
    started: Instant,
    timeout: Option<Duration>,
}

impl InProcessExecution {
    pub(crate) fn spawn(
        plugin_id: &str,
        hook: Arc<dyn ActionHook>,
        context: Arc<PhaseContext>,
        timeout: Option<Duration>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("casl-hook-{plugin_id}"))
            .spawn(move || {
                let result = match catch_unwind(AssertUnwindSafe(|| hook.run(&context))) {
                    Ok(result) => result.map_err(|error: HookError| error.message().to_owned()),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                drop(sender.send(result));
            });
        if let Err(error) = spawned {
            warn!(
                target: IN_PROCESS_TARGET,
                plugin = plugin_id,
                %error,
                "failed to start hook thread"
            );
        }
        Self {
            plugin_id: plugin_id.to_owned(),
            receiver: Some(receiver),
            started: Instant::now(),
            timeout,
        }
    }
}

impl Execution for InProcessExecution {
    fn poll(&mut self) -> Option<UnitOutcome> {
        let receiver = self.receiver.as_ref()?;
        let outcome = match receiver.try_recv() {
            Ok(Ok(())) => UnitOutcome::success(self.started.elapsed()),
            Ok(Err(error)) => UnitOutcome::failure(error, self.started.elapsed()),
            Err(TryRecvError::Disconnected) => UnitOutcome::failure(
                "hook thread exited without a result",
                self.started.elapsed(),
            ),
            Err(TryRecvError::Empty) => {
                let timeout = self.timeout?;
                if self.started.elapsed() < timeout {
                    return None;
                }
                warn!(
                    target: IN_PROCESS_TARGET,
                    plugin = self.plugin_id.as_str(),
                    timeout_secs = timeout.as_secs_f64(),
                    "in-process hook timed out and cannot be stopped, abandoning it"
                );
                UnitOutcome::timed_out(timeout, self.started.elapsed())
            }
        };
        self.receiver = None;
        Some(outcome)
    }

    fn cancel(self: Box<Self>, reason: &str) -> UnitOutcome {
        UnitOutcome::failure(reason, self.started.elapsed())
    }
}
