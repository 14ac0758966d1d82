//! Workspace configuration for the CASL plugin engine.
//!
//! Each workspace carries one configuration document per [`Phase`]. The
//! [`ConfigStore`] finds it among several candidate files, upgrades legacy
//! documents, reconciles it with the plugins currently on disk, and writes it
//! back atomically when anything changed:
//!
//! ```no_run
//! use casl_config::{ConfigStore, DiscoveredPlugin, EnvOverrides, Phase};
//!
//! let store = ConfigStore::new("/srv/app", Phase::Pre).with_backup(true);
//! let loaded = store.load(&[DiscoveredPlugin::new("headers", ["license"])]);
//! let timeout = loaded.config.options.effective_timeout(&EnvOverrides::from_env());
//! println!("{} plugins, timeout {timeout:?}", loaded.config.plugins.len());
//! ```

mod env;
mod error;
mod format;
mod logging;
mod migrate;
mod options;
mod phase;
mod store;
mod tags;
mod workspace;

pub use casl_sandbox::ResourceLimits;
pub use env::{EnvOverrides, PARALLELISM_VAR, PLUGIN_TIMEOUT_VAR};
pub use error::ConfigError;
pub use format::ConfigFormat;
pub use logging::{DEFAULT_LOG_FILTER, LogFormat, LogFormatParseError, LogSettings};
pub use options::ExecutionOptions;
pub use phase::Phase;
pub use store::{ConfigOrigin, ConfigStore, LoadedConfig};
pub use tags::{DEFAULT_BAND, band_name, describe_priority, order_by_tags, plugin_score, tag_score};
pub use workspace::{CURRENT_SCHEMA_VERSION, DiscoveredPlugin, PluginEntry, WorkspaceConfig};

#[cfg(test)]
mod tests;
