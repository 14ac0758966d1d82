//! The per-workspace configuration document and its sanitisation rules.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::options::ExecutionOptions;
use crate::phase::Phase;
use crate::tags::order_by_tags;

/// Schema version written by this crate.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Files recorded as required when present at synthesis time.
const REQUIRED_FILE_CANDIDATES: [&str; 5] = [
    "main.py",
    "app.py",
    "requirements.txt",
    "pyproject.toml",
    "Cargo.toml",
];

const DEFAULT_EXCLUDES: [&str; 7] = [
    ".git/**",
    "**/__pycache__/**",
    "**/*.pyc",
    "venv/**",
    ".venv/**",
    "node_modules/**",
    "target/**",
];

/// Identity and tags of a plugin found on disk, as seen by the config layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPlugin {
    /// Unique plugin id.
    pub id: String,
    /// Lower-cased tags used for default ordering.
    pub tags: Vec<String>,
}

impl DiscoveredPlugin {
    /// Creates a discovered plugin description.
    pub fn new<I, S>(id: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// Activation state and priority of one plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginEntry {
    /// Whether the plugin takes part in runs.
    pub enabled: bool,
    /// Explicit priority; smaller runs earlier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Default for PluginEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
        }
    }
}

/// Configuration for one phase of one workspace.
///
/// The store is the only writer. Schedulers and executors receive it
/// read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Document schema version.
    pub schema_version: u32,
    /// Workspace-relative files the build expects to exist.
    pub required_files: Vec<String>,
    /// Include globs for workspace file iteration.
    pub file_patterns: Vec<String>,
    /// Exclude globs for workspace file iteration.
    pub exclude_patterns: Vec<String>,
    /// Preferred plugin order. A hint only; `requires` edges still win.
    pub plugin_order: Vec<String>,
    /// Execution tunables.
    pub options: ExecutionOptions,
    /// Per-plugin activation and priority.
    pub plugins: BTreeMap<String, PluginEntry>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            required_files: Vec::new(),
            file_patterns: vec!["**/*".to_owned()],
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|glob| (*glob).to_owned()).collect(),
            plugin_order: Vec::new(),
            options: ExecutionOptions::default(),
            plugins: BTreeMap::new(),
        }
    }
}

impl WorkspaceConfig {
    /// Builds the default configuration for a workspace.
    ///
    /// Discovered plugins are ordered by their tag bands and numbered
    /// contiguously; all of them start enabled.
    #[must_use]
    pub fn synthesize(workspace_root: &Path, phase: Phase, discovered: &[DiscoveredPlugin]) -> Self {
        let plugin_order = order_by_tags(phase, discovered);
        let plugins = plugin_order
            .iter()
            .zip(0_i32..)
            .map(|(id, priority)| {
                (
                    id.clone(),
                    PluginEntry {
                        enabled: true,
                        priority: Some(priority),
                    },
                )
            })
            .collect();
        let required_files = REQUIRED_FILE_CANDIDATES
            .iter()
            .filter(|name| workspace_root.join(name).is_file())
            .map(|name| (*name).to_owned())
            .collect();
        Self {
            required_files,
            plugin_order,
            plugins,
            ..Self::default()
        }
    }

    /// Ids of plugins that are enabled in this document.
    #[must_use]
    pub fn enabled_plugin_ids(&self) -> BTreeSet<&str> {
        self.plugins
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Explicit priorities keyed by plugin id.
    #[must_use]
    pub fn priority_overrides(&self) -> BTreeMap<&str, i32> {
        self.plugins
            .iter()
            .filter_map(|(id, entry)| entry.priority.map(|priority| (id.as_str(), priority)))
            .collect()
    }

    /// Whether a plugin should run. Unknown ids default to enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.plugins.get(id).is_none_or(|entry| entry.enabled)
    }

    /// Priority the engine should assign to a plugin.
    ///
    /// A position in `plugin_order` takes precedence over an explicit
    /// priority; `None` leaves the plugin's own priority in place.
    #[must_use]
    pub fn effective_priority(&self, id: &str) -> Option<i32> {
        self.plugin_order
            .iter()
            .position(|entry| entry == id)
            .and_then(|index| i32::try_from(index).ok())
            .or_else(|| self.plugins.get(id).and_then(|entry| entry.priority))
    }

    /// Reconciles the document with the plugins currently on disk.
    ///
    /// Ids that are no longer discovered are dropped, newly discovered ids are
    /// appended enabled (in tag-band order among themselves), and priorities
    /// are renumbered to match the resulting order. Returns `true` when the
    /// document changed.
    pub fn sanitize(&mut self, phase: Phase, discovered: &[DiscoveredPlugin]) -> bool {
        let before = self.clone();
        let known: BTreeSet<&str> = discovered.iter().map(|plugin| plugin.id.as_str()).collect();

        self.plugins.retain(|id, _| known.contains(id.as_str()));
        let mut listed = BTreeSet::new();
        self.plugin_order
            .retain(|id| known.contains(id.as_str()) && listed.insert(id.clone()));

        let mut unlisted: Vec<(i32, &String)> = self
            .plugins
            .iter()
            .filter(|(id, _)| !listed.contains(*id))
            .map(|(id, entry)| (entry.priority.unwrap_or(i32::MAX), id))
            .collect();
        unlisted.sort();
        let unlisted: Vec<String> = unlisted.into_iter().map(|(_, id)| id.clone()).collect();
        self.plugin_order.extend(unlisted);
        self.sort_by_priority();

        let fresh: Vec<DiscoveredPlugin> = discovered
            .iter()
            .filter(|plugin| !self.plugins.contains_key(&plugin.id))
            .cloned()
            .collect();
        for id in order_by_tags(phase, &fresh) {
            self.plugins.entry(id.clone()).or_default();
            if !self.plugin_order.contains(&id) {
                self.plugin_order.push(id);
            }
        }

        for (id, priority) in self.plugin_order.iter().zip(0_i32..) {
            if let Some(entry) = self.plugins.get_mut(id) {
                entry.priority = Some(priority);
            }
        }
        *self != before
    }

    /// Stable-sorts `plugin_order` by explicit priority. Entries without one
    /// stay next to their predecessor.
    fn sort_by_priority(&mut self) {
        let mut previous = i64::MIN;
        let mut keyed: Vec<(i64, String)> = self
            .plugin_order
            .drain(..)
            .map(|id| {
                let key = self
                    .plugins
                    .get(&id)
                    .and_then(|entry| entry.priority)
                    .map_or(previous, i64::from);
                previous = key;
                (key, id)
            })
            .collect();
        keyed.sort_by_key(|(key, _)| *key);
        self.plugin_order = keyed.into_iter().map(|(_, id)| id).collect();
    }
}
