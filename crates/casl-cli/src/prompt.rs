//! Terminal confirmation prompts.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use casl_plugins::Prompter;
use tracing::warn;

const PROMPT_TARGET: &str = "casl_cli::prompt";

/// Asks yes/no questions on stderr and reads answers from stdin.
///
/// Plugins running in parallel share one terminal, so questions are
/// serialised.
#[derive(Debug, Default)]
pub(crate) struct TerminalPrompter {
    lock: Mutex<()>,
}

impl TerminalPrompter {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool) -> bool {
        let Ok(_turn) = self.lock.lock() else {
            return default;
        };
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let mut stderr = io::stderr().lock();
        if write!(stderr, "{question} {hint} ")
            .and_then(|()| stderr.flush())
            .is_err()
        {
            return default;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => parse_answer(&line).unwrap_or(default),
            Err(error) => {
                warn!(target: PROMPT_TARGET, %error, "failed to read answer");
                default
            }
        }
    }
}

/// Interprets a typed answer; `None` means "use the default".
fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
