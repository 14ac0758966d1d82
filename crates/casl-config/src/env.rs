//! Environment overrides for execution options.

use std::env;

use tracing::warn;

/// Environment variable overriding the per-plugin timeout in seconds.
pub const PLUGIN_TIMEOUT_VAR: &str = "CASL_PLUGIN_TIMEOUT";

/// Environment variable overriding the number of concurrent plugins.
pub const PARALLELISM_VAR: &str = "CASL_PARALLELISM";

const ENV_TARGET: &str = "casl_config::env";

/// Optional overrides read from the process environment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvOverrides {
    /// Timeout used when the configuration leaves it at zero.
    pub plugin_timeout: Option<f64>,
    /// Concurrency taking precedence over the configuration.
    pub parallelism: Option<u32>,
}

impl EnvOverrides {
    /// Reads overrides from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads overrides through an arbitrary lookup function.
    ///
    /// Unparseable values are ignored with a warning.
    ///
    /// ```
    /// use casl_config::EnvOverrides;
    ///
    /// let overrides = EnvOverrides::from_lookup(|key| match key {
    ///     "CASL_PARALLELISM" => Some("4".to_owned()),
    ///     _ => None,
    /// });
    /// assert_eq!(overrides.parallelism, Some(4));
    /// assert_eq!(overrides.plugin_timeout, None);
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            plugin_timeout: parse_var(&lookup, PLUGIN_TIMEOUT_VAR),
            parallelism: parse_var(&lookup, PARALLELISM_VAR),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: ENV_TARGET, variable = key, value = trimmed, "ignoring unparseable override");
            None
        }
    }
}
