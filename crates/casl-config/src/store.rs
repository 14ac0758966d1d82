//! Locating, loading, and persisting workspace configuration.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::format::ConfigFormat;
use crate::migrate::migrate;
use crate::phase::Phase;
use crate::workspace::{DiscoveredPlugin, WorkspaceConfig};

const STORE_TARGET: &str = "casl_config::store";

/// How a loaded configuration came to be.
#[derive(Debug, Clone)]
pub enum ConfigOrigin {
    /// Read from an existing file.
    File,
    /// No usable file existed; defaults were synthesised.
    Synthesized,
    /// The existing file could not be used; defaults apply in memory only.
    Fallback(ConfigError),
}

/// Result of [`ConfigStore::load`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The effective configuration.
    pub config: WorkspaceConfig,
    /// File the configuration belongs to.
    pub path: PathBuf,
    /// Where the configuration came from.
    pub origin: ConfigOrigin,
    /// Whether the file was (re)written during the load.
    pub persisted: bool,
}

/// Owner and sole writer of one phase's workspace configuration.
///
/// Candidate files are probed in a fixed preference order (JSON, YAML, YML,
/// TOML; plain name before dot-prefixed) and the first existing one wins.
/// Files are never merged.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    workspace_root: PathBuf,
    phase: Phase,
    backup: bool,
}

impl ConfigStore {
    /// Creates a store for the given workspace and phase.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, phase: Phase) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            phase,
            backup: false,
        }
    }

    /// Keeps a `.bak` copy of the previous file on every write.
    #[must_use]
    pub const fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Workspace this store manages.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Phase this store manages.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Candidate configuration files in preference order.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        let stem = self.phase.config_stem();
        ConfigFormat::PREFERENCE
            .iter()
            .flat_map(|(extension, _)| {
                [
                    self.workspace_root.join(format!("{stem}.{extension}")),
                    self.workspace_root.join(format!(".{stem}.{extension}")),
                ]
            })
            .collect()
    }

    /// First existing candidate file, if any.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }

    /// Path written when no configuration exists yet.
    #[must_use]
    pub fn default_path(&self) -> PathBuf {
        self.workspace_root
            .join(format!("{}.json", self.phase.config_stem()))
    }

    /// Loads the configuration, reconciling it with the discovered plugins.
    ///
    /// Never fails: unreadable or malformed files fall back to defaults in
    /// memory without being overwritten, and write failures are logged.
    #[must_use]
    pub fn load(&self, discovered: &[DiscoveredPlugin]) -> LoadedConfig {
        let Some(path) = self.locate() else {
            return self.synthesize(self.default_path(), discovered);
        };

        let document = match Self::read_document(&path) {
            Ok(Some(document)) => document,
            Ok(None) => return self.synthesize(path, discovered),
            Err(error) => {
                warn!(
                    target: STORE_TARGET,
                    path = %path.display(),
                    %error,
                    "configuration unusable, falling back to defaults"
                );
                let config = WorkspaceConfig::synthesize(&self.workspace_root, self.phase, discovered);
                return LoadedConfig {
                    config,
                    path,
                    origin: ConfigOrigin::Fallback(error),
                    persisted: false,
                };
            }
        };

        let (mut config, migrated) = document;
        let sanitized = config.sanitize(self.phase, discovered);
        let persisted = if migrated || sanitized {
            debug!(
                target: STORE_TARGET,
                path = %path.display(),
                migrated,
                sanitized,
                "writing reconciled configuration"
            );
            self.write_logged(&path, &config)
        } else {
            false
        };
        LoadedConfig {
            config,
            path,
            origin: ConfigOrigin::File,
            persisted,
        }
    }

    /// Persists a configuration to the located file, or the default path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when rendering or writing fails.
    pub fn save(&self, config: &WorkspaceConfig) -> Result<PathBuf, ConfigError> {
        let path = self.locate().unwrap_or_else(|| self.default_path());
        self.write(&path, config)?;
        Ok(path)
    }

    /// Atomically writes `config` to `path` in the format its extension names.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over the target. With backups enabled the previous file is
    /// copied to `<name>.bak` first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the extension is unsupported, rendering
    /// fails, or any filesystem step fails.
    pub fn write(&self, path: &Path, config: &WorkspaceConfig) -> Result<(), ConfigError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let text = format
            .render(config)
            .map_err(|message| ConfigError::Serialise { format, message })?;
        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut staged =
            NamedTempFile::new_in(directory).map_err(|source| ConfigError::write(path, source))?;
        staged
            .write_all(text.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|source| ConfigError::write(path, source))?;

        if self.backup && path.is_file() {
            fs::copy(path, backup_path(path)).map_err(|source| ConfigError::write(path, source))?;
        }
        staged
            .persist(path)
            .map_err(|error| ConfigError::write(path, error.error))?;
        info!(target: STORE_TARGET, path = %path.display(), "configuration written");
        Ok(())
    }

    /// Reads and decodes a file, applying legacy migration.
    ///
    /// Returns `Ok(None)` for an empty document and the migration flag
    /// alongside the decoded configuration otherwise.
    fn read_document(path: &Path) -> Result<Option<(WorkspaceConfig, bool)>, ConfigError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let text = fs::read_to_string(path).map_err(|source| ConfigError::read(path, source))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut document = format.parse(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        })?;
        match &document {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(_) => {}
            _ => {
                return Err(ConfigError::Shape {
                    path: path.to_path_buf(),
                    message: "expected a mapping at the document root".to_owned(),
                });
            }
        }
        let migrated = migrate(&mut document);
        let config = serde_json::from_value(document).map_err(|error| ConfigError::Shape {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Ok(Some((config, migrated)))
    }

    fn synthesize(&self, path: PathBuf, discovered: &[DiscoveredPlugin]) -> LoadedConfig {
        let config = WorkspaceConfig::synthesize(&self.workspace_root, self.phase, discovered);
        info!(
            target: STORE_TARGET,
            path = %path.display(),
            plugins = config.plugins.len(),
            "synthesising default configuration"
        );
        let persisted = self.write_logged(&path, &config);
        LoadedConfig {
            config,
            path,
            origin: ConfigOrigin::Synthesized,
            persisted,
        }
    }

    fn write_logged(&self, path: &Path, config: &WorkspaceConfig) -> bool {
        match self.write(path, config) {
            Ok(()) => true,
            Err(error) => {
                warn!(target: STORE_TARGET, %error, "configuration not persisted");
                false
            }
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".bak");
    path.with_file_name(name)
}
