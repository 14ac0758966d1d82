//! Upgrades legacy configuration documents to the current schema.
//!
//! Documents without a `schema_version` are version 0. Version 0 allowed a
//! bare boolean per plugin and used the short option names of the original
//! tooling; both are rewritten here before typed decoding.

use serde_json::{Map, Value};

use crate::workspace::CURRENT_SCHEMA_VERSION;

const OPTION_RENAMES: [(&str, &str); 3] = [
    ("plugin_timeout_s", "per_plugin_timeout_seconds"),
    ("plugin_parallelism", "parallelism"),
    ("iter_files_cache", "iteration_cache"),
];

const LIMIT_RENAMES: [(&str, &str); 4] = [
    ("mem_mb", "memory_mb"),
    ("cpu_time_s", "cpu_seconds"),
    ("nofile", "open_files"),
    ("fsize_mb", "output_mb"),
];

/// Migrates a parsed document in place, returning `true` if it changed.
pub(crate) fn migrate(document: &mut Value) -> bool {
    let Value::Object(root) = document else {
        return false;
    };
    let version = root
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version >= u64::from(CURRENT_SCHEMA_VERSION) {
        return false;
    }

    if let Some(Value::Object(plugins)) = root.get_mut("plugins") {
        for entry in plugins.values_mut() {
            if let Value::Bool(enabled) = *entry {
                let mut upgraded = Map::new();
                upgraded.insert("enabled".to_owned(), Value::Bool(enabled));
                *entry = Value::Object(upgraded);
            }
        }
    }

    if let Some(Value::Object(options)) = root.get_mut("options") {
        rename_keys(options, &OPTION_RENAMES);
        if let Some(limits) = options.remove("plugin_limits") {
            options.entry("resource_limits").or_insert(limits);
        }
        if let Some(Value::Object(limits)) = options.get_mut("resource_limits") {
            rename_keys(limits, &LIMIT_RENAMES);
        }
    }

    root.insert(
        "schema_version".to_owned(),
        Value::from(CURRENT_SCHEMA_VERSION),
    );
    true
}

fn rename_keys(map: &mut Map<String, Value>, renames: &[(&str, &str)]) {
    for (legacy, current) in renames {
        if let Some(value) = map.remove(*legacy) {
            map.entry(*current).or_insert(value);
        }
    }
}
