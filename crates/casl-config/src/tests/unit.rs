//! Unit tests for configuration helpers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use crate::env::EnvOverrides;
use crate::format::ConfigFormat;
use crate::logging::{LogFormat, LogSettings};
use crate::migrate::migrate;
use crate::options::ExecutionOptions;
use crate::phase::Phase;
use crate::store::{ConfigOrigin, ConfigStore};
use crate::tags::{DEFAULT_BAND, describe_priority, order_by_tags, plugin_score, tag_score};
use crate::workspace::{CURRENT_SCHEMA_VERSION, DiscoveredPlugin, PluginEntry, WorkspaceConfig};

#[fixture]
fn workspace() -> TempDir {
    TempDir::new().expect("failed to create workspace")
}

fn plugins(ids: &[&str]) -> Vec<DiscoveredPlugin> {
    ids.iter()
        .map(|id| DiscoveredPlugin::new(*id, Vec::<String>::new()))
        .collect()
}

#[rstest]
#[case(Phase::Pre, "CLEAN", 0)]
#[case(Phase::Pre, "license", 30)]
#[case(Phase::Pre, "ruff", 40)]
#[case(Phase::Post, "sign", 30)]
#[case(Phase::Post, "zip", 40)]
#[case(Phase::Post, "license", DEFAULT_BAND)]
fn tags_map_onto_phase_bands(#[case] phase: Phase, #[case] tag: &str, #[case] expected: u32) {
    assert_eq!(tag_score(phase, tag), expected);
}

#[test]
fn lowest_band_wins_across_tags() {
    assert_eq!(plugin_score(Phase::Post, &["report", "verify"]), 10);
    assert_eq!(plugin_score::<&str>(Phase::Post, &[]), DEFAULT_BAND);
}

#[test]
fn ties_within_a_band_are_broken_by_id() {
    let discovered = vec![
        DiscoveredPlugin::new("zeta", ["lint"]),
        DiscoveredPlugin::new("alpha", ["format"]),
        DiscoveredPlugin::new("wipe", ["clean"]),
    ];
    assert_eq!(
        order_by_tags(Phase::Pre, &discovered),
        vec!["wipe", "alpha", "zeta"]
    );
}

#[test]
fn describe_priority_names_the_band() {
    assert_eq!(
        describe_priority(Phase::Pre, "fmt", &["Lint"]),
        "fmt (lint) -> band 40: Formatting"
    );
}

#[test]
fn parallelism_prefers_environment_then_config_then_cpus() {
    let options = ExecutionOptions {
        parallelism: 3,
        ..ExecutionOptions::default()
    };
    let env = EnvOverrides {
        parallelism: Some(6),
        ..EnvOverrides::default()
    };
    assert_eq!(options.parallelism_for(&env, 8), 6);
    assert_eq!(options.parallelism_for(&EnvOverrides::default(), 8), 3);

    let auto = ExecutionOptions::default();
    assert_eq!(auto.parallelism_for(&EnvOverrides::default(), 8), 7);
    assert_eq!(auto.parallelism_for(&EnvOverrides::default(), 1), 1);
}

#[rstest]
#[case(0.0, None, None)]
#[case(0.0, Some(2.5), Some(Duration::from_millis(2500)))]
#[case(4.0, Some(2.5), Some(Duration::from_secs(4)))]
#[case(-1.0, Some(2.5), None)]
fn timeout_uses_environment_only_when_unset(
    #[case] configured: f64,
    #[case] env_timeout: Option<f64>,
    #[case] expected: Option<Duration>,
) {
    let options = ExecutionOptions {
        per_plugin_timeout_seconds: configured,
        ..ExecutionOptions::default()
    };
    let env = EnvOverrides {
        plugin_timeout: env_timeout,
        ..EnvOverrides::default()
    };
    assert_eq!(options.effective_timeout(&env), expected);
}

#[test]
fn unparseable_environment_values_are_ignored() {
    let overrides = EnvOverrides::from_lookup(|key| match key {
        "CASL_PLUGIN_TIMEOUT" => Some("soon".to_owned()),
        "CASL_PARALLELISM" => Some(" 2 ".to_owned()),
        _ => None,
    });
    assert_eq!(overrides.plugin_timeout, None);
    assert_eq!(overrides.parallelism, Some(2));
}

#[test]
fn legacy_documents_are_migrated() {
    let mut document = json!({
        "plugins": { "a": false, "b": { "enabled": true, "priority": 4 } },
        "options": {
            "plugin_timeout_s": 3.0,
            "plugin_parallelism": 2,
            "iter_files_cache": false,
            "plugin_limits": { "mem_mb": 128, "nofile": 64 }
        }
    });
    assert!(migrate(&mut document));
    let config: WorkspaceConfig =
        serde_json::from_value(document).expect("migrated document should decode");

    assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(
        config.plugins.get("a"),
        Some(&PluginEntry {
            enabled: false,
            priority: None
        })
    );
    assert!((config.options.per_plugin_timeout_seconds - 3.0).abs() < f64::EPSILON);
    assert_eq!(config.options.parallelism, 2);
    assert!(!config.options.iteration_cache);
    assert_eq!(config.options.resource_limits.memory_mb, 128);
    assert_eq!(config.options.resource_limits.open_files, 64);
}

#[test]
fn current_documents_are_not_migrated() {
    let mut document = json!({ "schema_version": CURRENT_SCHEMA_VERSION, "plugins": {} });
    assert!(!migrate(&mut document));
}

#[test]
fn sanitize_is_idempotent() {
    let discovered = plugins(&["a", "b", "c"]);
    let mut config = WorkspaceConfig::synthesize(Path::new("/nonexistent"), Phase::Pre, &discovered);
    assert!(!config.sanitize(Phase::Pre, &discovered));
}

#[test]
fn sanitize_honours_edited_priorities() {
    let discovered = plugins(&["a", "b", "c"]);
    let mut config = WorkspaceConfig::synthesize(Path::new("/nonexistent"), Phase::Pre, &discovered);
    if let Some(entry) = config.plugins.get_mut("c") {
        entry.priority = Some(-1);
    }
    assert!(config.sanitize(Phase::Pre, &discovered));
    assert_eq!(config.plugin_order, vec!["c", "a", "b"]);
    assert_eq!(config.effective_priority("c"), Some(0));
    assert_eq!(config.effective_priority("b"), Some(2));
}

#[test]
fn new_plugins_follow_hand_edited_priorities() {
    let mut config = WorkspaceConfig {
        plugin_order: vec!["a".to_owned(), "b".to_owned()],
        ..WorkspaceConfig::default()
    };
    config.plugins.insert(
        "a".to_owned(),
        PluginEntry {
            enabled: true,
            priority: Some(5),
        },
    );
    config.plugins.insert(
        "b".to_owned(),
        PluginEntry {
            enabled: true,
            priority: Some(1),
        },
    );

    assert!(config.sanitize(Phase::Pre, &plugins(&["a", "b", "c"])));
    assert_eq!(config.plugin_order, vec!["b", "a", "c"]);
    assert_eq!(config.effective_priority("c"), Some(2));
    assert!(config.is_enabled("c"));
}

#[test]
fn disabled_plugins_survive_sanitisation() {
    let discovered = plugins(&["a", "b"]);
    let mut config = WorkspaceConfig::synthesize(Path::new("/nonexistent"), Phase::Pre, &discovered);
    if let Some(entry) = config.plugins.get_mut("a") {
        entry.enabled = false;
    }
    config.sanitize(Phase::Pre, &discovered);
    assert!(!config.is_enabled("a"));
    assert!(config.is_enabled("b"));
    assert!(config.is_enabled("never-seen"));
    assert_eq!(config.enabled_plugin_ids().into_iter().collect::<Vec<_>>(), vec!["b"]);
}

#[rstest]
fn synthesis_records_present_required_files(workspace: TempDir) {
    fs::write(workspace.path().join("Cargo.toml"), "").expect("write manifest");
    let config = WorkspaceConfig::synthesize(workspace.path(), Phase::Pre, &[]);
    assert_eq!(config.required_files, vec!["Cargo.toml"]);
}

#[rstest]
#[case("bcasl.json", Some(ConfigFormat::Json))]
#[case(".bcasl.YML", Some(ConfigFormat::Yaml))]
#[case("acasl.toml", Some(ConfigFormat::Toml))]
#[case("acasl.ini", None)]
fn formats_follow_extensions(#[case] name: &str, #[case] expected: Option<ConfigFormat>) {
    assert_eq!(ConfigFormat::from_path(Path::new(name)), expected);
}

#[rstest]
fn json_wins_over_other_candidates(workspace: TempDir) {
    fs::write(workspace.path().join("acasl.toml"), "schema_version = 1\n").expect("write toml");
    fs::write(workspace.path().join(".acasl.json"), "{\"schema_version\": 1}").expect("write json");
    let store = ConfigStore::new(workspace.path(), Phase::Post);
    assert_eq!(store.locate(), Some(workspace.path().join(".acasl.json")));
}

#[rstest]
fn yaml_documents_load(workspace: TempDir) {
    let yaml = "plugins:\n  signer:\n    enabled: false\noptions:\n  parallelism: 2\n";
    fs::write(workspace.path().join("acasl.yaml"), yaml).expect("write yaml");
    let store = ConfigStore::new(workspace.path(), Phase::Post);
    let loaded = store.load(&[DiscoveredPlugin::new("signer", ["sign"])]);

    assert!(matches!(loaded.origin, ConfigOrigin::File));
    assert!(!loaded.config.is_enabled("signer"));
    assert_eq!(loaded.config.options.parallelism, 2);
}

#[rstest]
fn toml_documents_round_trip(workspace: TempDir) {
    let path = workspace.path().join("bcasl.toml");
    fs::write(&path, "schema_version = 1\nplugin_order = []\n").expect("write toml");
    let store = ConfigStore::new(workspace.path(), Phase::Pre);
    let first = store.load(&plugins(&["fmt"]));
    assert!(first.persisted, "new plugin should trigger a write");

    let second = store.load(&plugins(&["fmt"]));
    assert!(!second.persisted, "an unchanged document is not rewritten");
    assert_eq!(second.config.plugin_order, vec!["fmt"]);
}

#[rstest]
fn backups_keep_the_previous_document(workspace: TempDir) {
    let path = workspace.path().join("bcasl.json");
    fs::write(&path, "{\"schema_version\": 1}").expect("write json");
    let store = ConfigStore::new(workspace.path(), Phase::Pre).with_backup(true);
    let loaded = store.load(&plugins(&["fmt"]));

    assert!(loaded.persisted);
    let backup = fs::read_to_string(workspace.path().join("bcasl.json.bak")).expect("backup");
    assert_eq!(backup, "{\"schema_version\": 1}");
}

#[rstest]
fn empty_documents_are_replaced_with_defaults(workspace: TempDir) {
    fs::write(workspace.path().join("bcasl.yaml"), "").expect("write yaml");
    let store = ConfigStore::new(workspace.path(), Phase::Pre);
    let loaded = store.load(&plugins(&["fmt"]));
    assert!(matches!(loaded.origin, ConfigOrigin::Synthesized));
    assert_eq!(loaded.path, workspace.path().join("bcasl.yaml"));
}

#[test]
fn log_settings_ignore_blank_filters() {
    let settings = LogSettings::resolve(Some("  ".to_owned()), Some(LogFormat::Compact));
    assert_eq!(settings.filter, "info");
    assert_eq!(settings.format, LogFormat::Compact);
}
