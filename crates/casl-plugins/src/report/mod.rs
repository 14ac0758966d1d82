//! Per-run record of plugin outcomes.

use std::collections::BTreeSet;
use std::time::Duration;

use casl_config::Phase;
use serde::Serialize;

use crate::unit::PluginMetadata;

/// Longest error text kept on an item, in characters.
pub const MAX_ERROR_CHARS: usize = 4000;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Outcome of one plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionItem {
    /// Plugin id.
    pub plugin_id: String,
    /// Display name.
    pub name: String,
    /// Whether the hook returned normally.
    pub success: bool,
    /// Wall-clock time spent in the hook.
    pub duration_ms: f64,
    /// Failure text; empty on success.
    pub error: String,
    /// Plugin tags.
    pub tags: BTreeSet<String>,
}

impl ExecutionItem {
    /// Successful outcome.
    #[must_use]
    pub fn succeeded(metadata: &PluginMetadata, duration: Duration) -> Self {
        Self::new(metadata, true, duration, String::new())
    }

    /// Failed outcome; the error text is truncated.
    #[must_use]
    pub fn failed(metadata: &PluginMetadata, duration: Duration, error: &str) -> Self {
        Self::new(metadata, false, duration, truncate_error(error))
    }

    /// A plugin that could not be loaded. `id` is the plugin's directory name.
    #[must_use]
    pub fn discovery_failure(id: &str, error: &str) -> Self {
        Self {
            plugin_id: id.to_owned(),
            name: id.to_owned(),
            success: false,
            duration_ms: 0.0,
            error: truncate_error(error),
            tags: BTreeSet::new(),
        }
    }

    fn new(metadata: &PluginMetadata, success: bool, duration: Duration, error: String) -> Self {
        Self {
            plugin_id: metadata.id().to_owned(),
            name: metadata.name().to_owned(),
            success,
            duration_ms: duration.as_secs_f64() * 1000.0,
            error,
            tags: metadata.tags().clone(),
        }
    }
}

/// Ordered record of one run.
///
/// ```
/// use std::time::Duration;
/// use casl_config::Phase;
/// use casl_plugins::{ExecutionItem, ExecutionReport, PluginMetadata};
///
/// let meta = PluginMetadata::new("headers").expect("valid id");
/// let mut report = ExecutionReport::new(Phase::Pre);
/// report.add(ExecutionItem::succeeded(&meta, Duration::from_millis(12)));
/// report.add(ExecutionItem::failed(&meta, Duration::from_millis(3), "boom"));
/// assert!(!report.ok());
/// assert_eq!(report.summary(), "Plugins: 1/2 ok, 1 failed, total time 15.0 ms");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    phase: Phase,
    items: Vec<ExecutionItem>,
    cancelled: bool,
    not_run: Vec<String>,
}

impl ExecutionReport {
    /// Empty report for a phase.
    #[must_use]
    pub const fn new(phase: Phase) -> Self {
        Self {
            phase,
            items: Vec::new(),
            cancelled: false,
            not_run: Vec::new(),
        }
    }

    /// Appends an outcome.
    pub fn add(&mut self, item: ExecutionItem) {
        self.items.push(item);
    }

    /// Phase the report belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Outcomes in completion order.
    #[must_use]
    pub fn items(&self) -> &[ExecutionItem] {
        &self.items
    }

    /// Number of outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no outcome was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` iff every recorded item succeeded.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.items.iter().all(|item| item.success)
    }

    /// Whether the run was cancelled before every plugin launched.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Ids that were never launched because of cancellation.
    #[must_use]
    pub fn not_run(&self) -> &[String] {
        &self.not_run
    }

    /// Sum of item durations in milliseconds.
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.items.iter().map(|item| item.duration_ms).sum()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let total = self.items.len();
        let ok = self.succeeded().count();
        format!(
            "Plugins: {ok}/{total} ok, {} failed, total time {:.1} ms",
            total - ok,
            self.total_ms()
        )
    }

    /// Failed items.
    pub fn failed(&self) -> impl Iterator<Item = &ExecutionItem> {
        self.items.iter().filter(|item| !item.success)
    }

    /// Successful items.
    pub fn succeeded(&self) -> impl Iterator<Item = &ExecutionItem> {
        self.items.iter().filter(|item| item.success)
    }

    /// Items whose plugin carries `tag` (case-insensitive).
    pub fn with_tag(&self, tag: &str) -> impl Iterator<Item = &ExecutionItem> {
        let tag = tag.trim().to_lowercase();
        self.items
            .iter()
            .filter(move |item| item.tags.contains(&tag))
    }

    /// Inserts discovery failures ahead of executed items.
    pub(crate) fn prepend(&mut self, items: Vec<ExecutionItem>) {
        self.items.splice(0..0, items);
    }

    pub(crate) fn mark_cancelled(&mut self, not_run: Vec<String>) {
        self.cancelled = true;
        self.not_run = not_run;
    }
}

impl<'a> IntoIterator for &'a ExecutionReport {
    type Item = &'a ExecutionItem;
    type IntoIter = std::slice::Iter<'a, ExecutionItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Bounds error text to [`MAX_ERROR_CHARS`], appending a marker when cut.
#[must_use]
pub fn truncate_error(error: &str) -> String {
    let error = error.trim_end();
    match error.char_indices().nth(MAX_ERROR_CHARS) {
        None => error.to_owned(),
        Some((cut, _)) => {
            let mut bounded = error.get(..cut).unwrap_or(error).to_owned();
            bounded.push_str(TRUNCATION_MARKER);
            bounded
        }
    }
}
