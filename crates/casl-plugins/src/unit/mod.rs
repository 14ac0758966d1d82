//! Plugin identity and schedulable units.
//!
//! [`PluginMetadata`] is the immutable description of a plugin. A
//! [`PluginUnit`] binds that description to scheduling attributes
//! (`requires`, `priority`, insertion order) and to the hook that runs it.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use casl_config::Phase;
use serde::Serialize;

use crate::error::PluginError;
use crate::hook::ActionHook;

/// Priority assigned to plugins that do not declare one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Immutable description of a plugin.
///
/// # Example
///
/// ```
/// use casl_plugins::PluginMetadata;
///
/// let meta = PluginMetadata::new("  headers ")
///     .expect("id is valid")
///     .with_name("License headers")
///     .with_tags(["License", "SPDX"]);
/// assert_eq!(meta.id(), "headers");
/// assert!(meta.tags().contains("spdx"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    id: String,
    name: String,
    version: String,
    description: String,
    author: String,
    tags: BTreeSet<String>,
}

impl PluginMetadata {
    /// Creates metadata for the given id, trimming surrounding whitespace.
    ///
    /// The display name defaults to the id.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::EmptyId`] when the trimmed id is empty.
    pub fn new(id: impl AsRef<str>) -> Result<Self, PluginError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(PluginError::EmptyId);
        }
        Ok(Self {
            id: id.to_owned(),
            name: id.to_owned(),
            version: String::new(),
            description: String::new(),
            author: String::new(),
            tags: BTreeSet::new(),
        })
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the version string.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the human description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Replaces the tags, lower-casing and dropping blanks.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        self
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Human description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Author.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Lower-cased tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

/// An external executable speaking the JSONL hook protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHook {
    executable: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessHook {
    /// Creates a process hook for an absolute executable path.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Sets the arguments passed to the executable.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Runs the executable from the given directory instead of the workspace.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory override.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

/// How a unit's hook is invoked.
#[derive(Clone)]
pub enum HookBinding {
    /// Child process, sandboxed when the run enables sandboxing.
    Process(ProcessHook),
    /// Rust hook running on a worker thread inside the host.
    InProcess(Arc<dyn ActionHook>),
}

impl fmt::Debug for HookBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(hook) => f.debug_tuple("Process").field(hook).finish(),
            Self::InProcess(_) => f.write_str("InProcess(..)"),
        }
    }
}

/// One independently schedulable plugin.
#[derive(Debug, Clone)]
pub struct PluginUnit {
    metadata: PluginMetadata,
    requires: BTreeSet<String>,
    priority: i32,
    insertion_index: u64,
    active: bool,
    phases: BTreeSet<Phase>,
    hook: HookBinding,
}

impl PluginUnit {
    /// Creates an active unit that runs in both phases.
    #[must_use]
    pub fn new(metadata: PluginMetadata, hook: HookBinding) -> Self {
        Self {
            metadata,
            requires: BTreeSet::new(),
            priority: DEFAULT_PRIORITY,
            insertion_index: 0,
            active: true,
            phases: Phase::ALL.into_iter().collect(),
            hook,
        }
    }

    /// Convenience constructor for an in-process hook.
    pub fn in_process(metadata: PluginMetadata, hook: impl ActionHook + 'static) -> Self {
        Self::new(metadata, HookBinding::InProcess(Arc::new(hook)))
    }

    /// Declares the ids this unit must run after.
    #[must_use]
    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.requires = requires
            .into_iter()
            .map(|id| id.as_ref().trim().to_owned())
            .filter(|id| !id.is_empty())
            .collect();
        self
    }

    /// Sets the priority; smaller runs earlier.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts the unit to the given phases.
    #[must_use]
    pub fn with_phases<I: IntoIterator<Item = Phase>>(mut self, phases: I) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }

    /// Metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    /// Ids this unit must run after.
    #[must_use]
    pub const fn requires(&self) -> &BTreeSet<String> {
        &self.requires
    }

    /// Priority; smaller runs earlier.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Registration order, used as a tie-break.
    #[must_use]
    pub const fn insertion_index(&self) -> u64 {
        self.insertion_index
    }

    /// Whether the unit takes part in scheduling.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the unit runs in the given phase.
    #[must_use]
    pub fn runs_in(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    /// How the hook is invoked.
    #[must_use]
    pub const fn hook(&self) -> &HookBinding {
        &self.hook
    }

    /// Scheduling key: `(priority, insertion_index, id)`.
    #[must_use]
    pub fn schedule_key(&self) -> (i32, u64, String) {
        (self.priority, self.insertion_index, self.id().to_owned())
    }

    pub(crate) const fn set_insertion_index(&mut self, index: u64) {
        self.insertion_index = index;
    }

    pub(crate) const fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) const fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}
