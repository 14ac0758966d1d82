//! On-disk description of a process plugin.
//!
//! A [`PluginManifest`] is the `plugin.toml` file found in each plugin
//! directory. It declares the plugin's identity, its scheduling hints and the
//! executable the host spawns. Manifests are validated after parsing to reject
//! obviously invalid declarations before anything is scheduled.

use std::path::{Path, PathBuf};

use casl_config::Phase;
use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::unit::{DEFAULT_PRIORITY, HookBinding, PluginMetadata, PluginUnit, ProcessHook};

/// File name of a plugin manifest inside its directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Declarative description of a process plugin.
///
/// # Example
///
/// ```
/// use casl_plugins::PluginManifest;
///
/// let manifest = PluginManifest::parse(
///     r#"
///     id = "headers"
///     executable = "bin/headers"
///     tags = ["license"]
///     "#,
///     "plugin.toml",
/// )
/// .expect("manifest is valid");
///
/// assert_eq!(manifest.id(), "headers");
/// assert_eq!(manifest.priority(), 100);
/// assert_eq!(manifest.phases().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default = "default_phases")]
    phases: Vec<Phase>,
    executable: PathBuf,
    #[serde(default)]
    args: Vec<String>,
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_phases() -> Vec<Phase> {
    Phase::ALL.to_vec()
}

impl PluginManifest {
    /// Reads and validates the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if the file cannot be read, is not
    /// valid TOML, or fails validation.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let text = std::fs::read_to_string(path).map_err(|error| PluginError::Manifest {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// Parses and validates manifest text; `path` is used in diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if the text is not valid TOML or
    /// fails validation.
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = path.as_ref();
        let manifest: Self = toml::from_str(text).map_err(|error| PluginError::Manifest {
            path: path.to_path_buf(),
            message: error.message().to_owned(),
        })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    /// Validates the manifest, returning an error if it is malformed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if the id or executable is empty, or
    /// the plugin declares no phases.
    pub fn validate(&self, path: &Path) -> Result<(), PluginError> {
        let invalid = |message: &str| PluginError::Manifest {
            path: path.to_path_buf(),
            message: message.to_owned(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("plugin id must not be empty"));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(invalid("plugin executable must not be empty"));
        }
        if self.phases.is_empty() {
            return Err(invalid("plugin must run in at least one phase"));
        }
        Ok(())
    }

    /// Plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.trim()
    }

    /// Declared priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Phases the plugin runs in.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Declared dependencies.
    #[must_use]
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Executable as written in the manifest.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Default arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Executable path, resolved against the plugin directory when relative.
    #[must_use]
    pub fn resolve_executable(&self, plugin_dir: &Path) -> PathBuf {
        if self.executable.is_absolute() {
            self.executable.clone()
        } else {
            plugin_dir.join(&self.executable)
        }
    }

    /// Builds a schedulable process unit rooted at `plugin_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ExecutableNotFound`] when the resolved
    /// executable is not a file, or [`PluginError::EmptyId`] for a blank id.
    pub fn into_unit(self, plugin_dir: &Path) -> Result<PluginUnit, PluginError> {
        let executable = self.resolve_executable(plugin_dir);
        if !executable.is_file() {
            return Err(PluginError::ExecutableNotFound {
                id: self.id().to_owned(),
                path: executable,
            });
        }
        let mut metadata = PluginMetadata::new(&self.id)?
            .with_version(self.version)
            .with_description(self.description)
            .with_author(self.author)
            .with_tags(self.tags);
        if !self.name.trim().is_empty() {
            metadata = metadata.with_name(self.name);
        }
        let hook = ProcessHook::new(executable).with_args(self.args);
        Ok(PluginUnit::new(metadata, HookBinding::Process(hook))
            .with_requires(self.requires)
            .with_priority(self.priority)
            .with_phases(self.phases))
    }
}
