//! Shared builders for plugin engine tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::context::PhaseContext;
use crate::error::HookError;
use crate::hook::FnHook;
use crate::unit::{HookBinding, PluginMetadata, PluginUnit, ProcessHook};

/// Response line a successful process plugin prints.
pub const SUCCESS_LINE: &str = r#"echo '{"status":"success"}'"#;

pub fn shell() -> PathBuf {
    ["/bin/sh", "/usr/bin/sh"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .expect("a POSIX shell is required for process plugin tests")
}

pub fn meta(id: &str) -> PluginMetadata {
    PluginMetadata::new(id).expect("valid plugin id")
}

/// A process plugin running `script` through the shell.
pub fn shell_unit(id: &str, script: &str) -> PluginUnit {
    let hook = ProcessHook::new(shell()).with_args(vec!["-c".to_owned(), script.to_owned()]);
    PluginUnit::new(meta(id), HookBinding::Process(hook))
}

/// An in-process plugin that succeeds immediately.
pub fn noop_unit(id: &str) -> PluginUnit {
    PluginUnit::in_process(meta(id), FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(())))
}

/// Shared log of hook start and finish events.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, event: String) {
        self.events.lock().expect("journal lock").push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("journal lock").clone()
    }

    /// Ids in the order their hooks started.
    pub fn starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix("start:").map(ToOwned::to_owned))
            .collect()
    }

    /// Position of an event, if recorded.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|recorded| recorded == event)
    }

    /// An in-process unit that journals its start and finish, sleeping in
    /// between, and fails when `fail` is set.
    pub fn unit(&self, id: &str, sleep: Duration, fail: bool) -> PluginUnit {
        let journal = self.clone();
        let name = id.to_owned();
        PluginUnit::in_process(
            meta(id),
            FnHook::new(move |_: &PhaseContext| {
                journal.record(format!("start:{name}"));
                thread::sleep(sleep);
                journal.record(format!("end:{name}"));
                if fail {
                    Err(HookError::new(format!("{name} failed")))
                } else {
                    Ok(())
                }
            }),
        )
    }
}
