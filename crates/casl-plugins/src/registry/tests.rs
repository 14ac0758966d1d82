//! Unit tests for the plugin registry.

use rstest::{fixture, rstest};

use super::*;
use crate::context::PhaseContext;
use crate::error::HookError;
use crate::hook::FnHook;

fn unit(id: &str, priority: i32, tags: &[&str]) -> PluginUnit {
    let meta = PluginMetadata::new(id)
        .expect("valid id")
        .with_tags(tags.iter().copied());
    PluginUnit::in_process(meta, FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(())))
        .with_priority(priority)
}

#[fixture]
fn populated_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.add(unit("lint", 40, &["lint"])).expect("add lint");
    registry.add(unit("clean", 0, &["clean"])).expect("add clean");
    registry.add(unit("fmt", 40, &["format", "lint"])).expect("add fmt");
    registry
}

#[test]
fn new_registry_is_empty() {
    let registry = PluginRegistry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);
}

#[test]
fn add_rejects_duplicates() {
    let mut registry = PluginRegistry::new();
    registry.add(unit("fmt", 1, &[])).expect("first add");
    let error = registry
        .add(unit("fmt", 2, &[]))
        .expect_err("duplicate should fail");
    assert!(matches!(error, PluginError::DuplicateId { ref id } if id == "fmt"));
    assert_eq!(registry.get("fmt").map(PluginUnit::priority), Some(1));
}

#[rstest]
fn insertion_indices_are_monotonic(populated_registry: PluginRegistry) {
    let index = |id: &str| {
        populated_registry
            .get(id)
            .map(PluginUnit::insertion_index)
            .expect("registered")
    };
    assert!(index("lint") < index("clean"));
    assert!(index("clean") < index("fmt"));
}

#[rstest]
fn list_sorts_by_priority_then_id(populated_registry: PluginRegistry) {
    let ids: Vec<&str> = populated_registry
        .list(true, None)
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(ids, vec!["clean", "fmt", "lint"]);
}

#[rstest]
fn list_filters_by_tag(populated_registry: PluginRegistry) {
    let ids: Vec<&str> = populated_registry
        .list(true, Some("LINT"))
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(ids, vec!["fmt", "lint"]);
}

#[rstest]
fn disabled_units_are_hidden_unless_requested(mut populated_registry: PluginRegistry) {
    assert!(populated_registry.disable("fmt"));
    assert_eq!(populated_registry.list(false, None).len(), 2);
    let all = populated_registry.list(true, None);
    assert!(all.iter().any(|entry| entry.id == "fmt" && !entry.active));
    assert!(populated_registry.enable("fmt"));
    assert_eq!(populated_registry.active_units().len(), 3);
}

#[rstest]
#[case::enable(PluginRegistry::enable as fn(&mut PluginRegistry, &str) -> bool)]
#[case::disable(PluginRegistry::disable as fn(&mut PluginRegistry, &str) -> bool)]
#[case::remove(PluginRegistry::remove as fn(&mut PluginRegistry, &str) -> bool)]
fn unknown_ids_report_false(
    mut populated_registry: PluginRegistry,
    #[case] operation: fn(&mut PluginRegistry, &str) -> bool,
) {
    assert!(!operation(&mut populated_registry, "missing"));
}

#[rstest]
fn set_priority_reorders_listing(mut populated_registry: PluginRegistry) {
    assert!(populated_registry.set_priority("lint", -5));
    assert!(!populated_registry.set_priority("missing", 0));
    let first = populated_registry.list(false, None).first().map(|entry| entry.id);
    assert_eq!(first, Some("lint"));
}

#[rstest]
fn remove_drops_the_unit(mut populated_registry: PluginRegistry) {
    assert!(populated_registry.remove("clean"));
    assert!(!populated_registry.contains("clean"));
    assert_eq!(populated_registry.len(), 2);
}
