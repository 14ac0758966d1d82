//! Handle to a running sandboxed process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capture::{CapturedOutput, StreamCapture};

/// Tracing target for child lifecycle events.
const CHILD_TARGET: &str = "casl_sandbox::child";

const EXIT_POLL: Duration = Duration::from_millis(10);

/// A running sandboxed child and the background readers draining its output.
///
/// The child leads its own process group, so [`SandboxChild::terminate`]
/// reaches every process it spawned.
#[derive(Debug)]
pub struct SandboxChild {
    program: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: StreamCapture,
    stderr: StreamCapture,
}

impl SandboxChild {
    pub(crate) const fn new(
        program: PathBuf,
        child: Child,
        stdin: Option<ChildStdin>,
        stdout: StreamCapture,
        stderr: StreamCapture,
    ) -> Self {
        Self {
            program,
            child,
            stdin,
            stdout,
            stderr,
        }
    }

    /// Operating system process identifier.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Program the child was launched from.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Takes ownership of the child's standard input.
    ///
    /// Dropping the returned handle closes the pipe.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Checks for exit without blocking.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the operating system.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Blocks until the child exits.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the operating system.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        drop(self.stdin.take());
        self.child.wait()
    }

    /// Whether both output pipes have closed.
    ///
    /// A grandchild that inherited the pipes keeps this `false` after the
    /// child itself has exited.
    #[must_use]
    pub fn output_closed(&self) -> bool {
        self.stdout.is_closed() && self.stderr.is_closed()
    }

    /// Consumes the handle, returning whatever output was captured.
    ///
    /// Waits at most `settle` for the output pipes to close.
    #[must_use]
    pub fn into_output(self, settle: Duration) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.finish(settle),
            stderr: self.stderr.finish(settle),
        }
    }

    /// Terminates the process group and returns without waiting for it.
    ///
    /// The group first receives a polite termination signal; a reaper thread
    /// escalates to a forced kill once `grace` elapses and then reaps the
    /// child. Output captured so far is returned immediately.
    pub fn terminate(self, grace: Duration) -> (CapturedOutput, JoinHandle<()>) {
        let Self {
            program,
            mut child,
            stdin,
            stdout,
            stderr,
        } = self;
        drop(stdin);

        signal_group(&mut child, GroupSignal::Terminate);
        let reaper = thread::spawn(move || {
            let deadline = Instant::now() + grace;
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(
                            target: CHILD_TARGET,
                            program = %program.display(),
                            ?status,
                            "terminated child reaped"
                        );
                        return;
                    }
                    Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                    Ok(None) | Err(_) => break,
                }
            }
            warn!(
                target: CHILD_TARGET,
                program = %program.display(),
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "child ignored termination, killing process group"
            );
            signal_group(&mut child, GroupSignal::Kill);
            drop(child.wait());
        });

        let output = CapturedOutput {
            stdout: stdout.finish(Duration::ZERO),
            stderr: stderr.finish(Duration::ZERO),
        };
        (output, reaper)
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        drop(child.kill());
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(error) = killpg(Pid::from_raw(raw), signal) {
        debug!(
            target: CHILD_TARGET,
            pid = raw,
            %error,
            "signalling process group failed, falling back to direct kill"
        );
        drop(child.kill());
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _signal: GroupSignal) {
    drop(child.kill());
}
