//! Document formats accepted for workspace configuration.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};

/// Serialisation format of a configuration file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConfigFormat {
    /// `.json`
    Json,
    /// `.yaml` or `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Extensions in preference order, paired with their format.
    pub const PREFERENCE: [(&'static str, Self); 4] = [
        ("json", Self::Json),
        ("yaml", Self::Yaml),
        ("yml", Self::Yaml),
        ("toml", Self::Toml),
    ];

    /// Infers the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::PREFERENCE
            .iter()
            .find(|(candidate, _)| *candidate == extension)
            .map(|(_, format)| *format)
    }

    /// Parses text into a generic document tree.
    pub(crate) fn parse(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|error| error.to_string()),
            Self::Yaml => serde_saphyr::from_str(text).map_err(|error| error.to_string()),
            Self::Toml => toml::from_str::<toml::Value>(text)
                .map(toml_to_json)
                .map_err(|error| error.to_string()),
        }
    }

    /// Renders a value, always ending with a newline.
    pub(crate) fn render<T: Serialize>(self, value: &T) -> Result<String, String> {
        let mut text = match self {
            Self::Json => serde_json::to_string_pretty(value).map_err(|error| error.to_string())?,
            Self::Yaml => serde_saphyr::to_string(value).map_err(|error| error.to_string())?,
            Self::Toml => toml::to_string_pretty(value).map_err(|error| error.to_string())?,
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(text) => Value::String(text),
        toml::Value::Integer(number) => Value::from(number),
        toml::Value::Float(number) => Value::from(number),
        toml::Value::Boolean(flag) => Value::Bool(flag),
        toml::Value::Datetime(stamp) => Value::String(stamp.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, entry)| (key, toml_to_json(entry)))
                .collect(),
        ),
    }
}
