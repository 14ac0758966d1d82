//! Plugin discovery.
//!
//! A [`PluginLoader`] turns some plugin source into schedulable units. The
//! scheduler and executors only see [`PluginUnit`]s, so how a hook was
//! obtained stays behind this trait. Discovery never fails as a whole: each
//! plugin that cannot be loaded becomes a [`DiscoveryFailure`] and the rest
//! still load.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PluginError;
use crate::manifest::{MANIFEST_FILE, PluginManifest};
use crate::unit::PluginUnit;

const LOADER_TARGET: &str = "casl_plugins::loader";

/// A plugin that could not be loaded.
#[derive(Debug, Clone)]
pub struct DiscoveryFailure {
    /// Plugin id, or the directory name when the manifest is unusable.
    pub plugin_id: String,
    /// Why loading failed.
    pub error: PluginError,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Loaded units, in discovery order.
    pub units: Vec<PluginUnit>,
    /// Plugins that failed to load.
    pub failures: Vec<DiscoveryFailure>,
}

impl Discovery {
    /// Appends another discovery's units and failures.
    pub fn merge(&mut self, other: Self) {
        self.units.extend(other.units);
        self.failures.extend(other.failures);
    }

    /// Ids of every loaded unit.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(PluginUnit::id).collect()
    }
}

/// Source of plugin units.
pub trait PluginLoader: Send + Sync {
    /// Discovers the plugins this loader knows about.
    fn discover(&self) -> Discovery;
}

/// Loads process plugins from `<dir>/<name>/plugin.toml`.
///
/// Subdirectories without a manifest and hidden entries are skipped. A
/// missing plugins directory yields an empty discovery.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Creates a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory scanned for plugins.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_one(dir: &Path, fallback_id: &str) -> Result<PluginUnit, DiscoveryFailure> {
        let manifest = PluginManifest::load(&dir.join(MANIFEST_FILE)).map_err(|error| DiscoveryFailure {
            plugin_id: fallback_id.to_owned(),
            error,
        })?;
        let id = manifest.id().to_owned();
        manifest
            .into_unit(dir)
            .map_err(|error| DiscoveryFailure { plugin_id: id, error })
    }
}

impl PluginLoader for DirectoryLoader {
    fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        if !self.root.is_dir() {
            debug!(
                target: LOADER_TARGET,
                root = %self.root.display(),
                "plugins directory not found"
            );
            return discovery;
        }
        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(target: LOADER_TARGET, %error, "skipping unreadable plugin entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type().is_dir() || name.starts_with('.') {
                continue;
            }
            if !entry.path().join(MANIFEST_FILE).is_file() {
                debug!(target: LOADER_TARGET, dir = %entry.path().display(), "no manifest, skipping");
                continue;
            }
            match Self::load_one(entry.path(), &name) {
                Ok(unit) => {
                    debug!(target: LOADER_TARGET, plugin = unit.id(), "discovered plugin");
                    discovery.units.push(unit);
                }
                Err(failure) => {
                    warn!(
                        target: LOADER_TARGET,
                        plugin = failure.plugin_id.as_str(),
                        error = %failure.error,
                        "failed to load plugin"
                    );
                    discovery.failures.push(failure);
                }
            }
        }
        discovery
    }
}

/// Serves a fixed set of units, typically in-process hooks.
///
/// # Example
///
/// ```
/// use casl_plugins::{FnHook, HookError, PhaseContext, PluginLoader, PluginMetadata,
///     PluginUnit, StaticLoader};
///
/// let unit = PluginUnit::in_process(
///     PluginMetadata::new("touch").expect("valid id"),
///     FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(())),
/// );
/// let loader = StaticLoader::new(vec![unit]);
/// assert_eq!(loader.discover().ids(), vec!["touch"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    units: Vec<PluginUnit>,
}

impl StaticLoader {
    /// Creates a loader serving `units`.
    #[must_use]
    pub const fn new(units: Vec<PluginUnit>) -> Self {
        Self { units }
    }

    /// Adds a unit.
    #[must_use]
    pub fn with_unit(mut self, unit: PluginUnit) -> Self {
        self.units.push(unit);
        self
    }
}

impl PluginLoader for StaticLoader {
    fn discover(&self) -> Discovery {
        Discovery {
            units: self.units.clone(),
            failures: Vec::new(),
        }
    }
}
