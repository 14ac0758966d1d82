//! Log output settings shared by the binaries.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Filter and format used to install the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_owned(),
            format: LogFormat::default(),
        }
    }
}

impl LogSettings {
    /// Overlays explicitly provided values on the defaults.
    #[must_use]
    pub fn resolve(filter: Option<String>, format: Option<LogFormat>) -> Self {
        let defaults = Self::default();
        Self {
            filter: filter
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.filter),
            format: format.unwrap_or(defaults.format),
        }
    }
}
