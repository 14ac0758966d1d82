//! Interrupt handling for phase runs.
//!
//! The first `SIGINT` or `SIGTERM` sets the engine's cancel flag so running
//! plugins are stopped and the report is still written. A second `SIGINT`
//! while the flag is set terminates the process with status 130.

use std::io;

use casl_plugins::CancelToken;
use signal_hook::SigId;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing::debug;

const SIGNALS_TARGET: &str = "casl_cli::signals";
const FORCED_EXIT_STATUS: i32 = 130;

/// Registered handlers; dropping the guard unregisters them.
#[derive(Debug)]
pub(crate) struct InterruptGuard {
    ids: Vec<SigId>,
}

impl InterruptGuard {
    /// Routes termination signals to `token`.
    pub(crate) fn install(token: &CancelToken) -> io::Result<Self> {
        let cancelled = token.flag();
        let mut ids = Vec::with_capacity(3);
        // Registered before the flag setter so the first signal only cancels.
        ids.push(flag::register_conditional_shutdown(
            SIGINT,
            FORCED_EXIT_STATUS,
            cancelled.clone(),
        )?);
        for signal in [SIGINT, SIGTERM] {
            ids.push(flag::register(signal, cancelled.clone())?);
        }
        debug!(target: SIGNALS_TARGET, "interrupt handlers installed");
        Ok(Self { ids })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
