//! Unit tests for dependency scheduling.

use rstest::rstest;

use super::*;
use crate::context::PhaseContext;
use crate::error::HookError;
use crate::hook::FnHook;
use crate::registry::PluginRegistry;
use crate::unit::PluginMetadata;

fn unit(id: &str, priority: i32, requires: &[&str]) -> PluginUnit {
    let meta = PluginMetadata::new(id).expect("valid id");
    PluginUnit::in_process(meta, FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(())))
        .with_priority(priority)
        .with_requires(requires.iter().copied())
}

fn registry(units: Vec<PluginUnit>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for unit in units {
        registry.add(unit).expect("unique ids");
    }
    registry
}

fn order_of(registry: &PluginRegistry) -> Vec<String> {
    DependencyScheduler::order(registry.active_units()).order
}

#[test]
fn dependencies_outrank_priority() {
    let registry = registry(vec![
        unit("A", 10, &[]),
        unit("B", 5, &["A"]),
        unit("C", 1, &[]),
    ]);
    assert_eq!(order_of(&registry), vec!["C", "A", "B"]);
}

#[test]
fn equal_priorities_fall_back_to_insertion_order() {
    let registry = registry(vec![
        unit("zeta", 0, &[]),
        unit("alpha", 0, &[]),
        unit("mid", 0, &[]),
    ]);
    assert_eq!(order_of(&registry), vec!["zeta", "alpha", "mid"]);
}

#[test]
fn diamond_respects_every_edge() {
    let registry = registry(vec![
        unit("root", 50, &[]),
        unit("left", 1, &["root"]),
        unit("right", 0, &["root"]),
        unit("join", 0, &["left", "right"]),
    ]);
    assert_eq!(order_of(&registry), vec!["root", "right", "left", "join"]);
}

#[test]
fn two_node_cycle_still_schedules_both() {
    let registry = registry(vec![unit("A", 1, &["B"]), unit("B", 2, &["A"])]);
    let schedule = DependencyScheduler::order(registry.active_units());
    assert!(schedule.has_cycle());
    assert_eq!(schedule.order.len(), 2);
    assert!(schedule.order.contains(&"A".to_owned()));
    assert!(schedule.order.contains(&"B".to_owned()));
}

#[test]
fn cycle_remainder_follows_acyclic_prefix_in_key_order() {
    let registry = registry(vec![
        unit("free", 9, &[]),
        unit("x", 3, &["y"]),
        unit("y", 1, &["x"]),
        unit("tail", 0, &["x"]),
    ]);
    let schedule = DependencyScheduler::order(registry.active_units());
    assert_eq!(schedule.order, vec!["free", "tail", "y", "x"]);
    assert_eq!(schedule.cyclic, vec!["tail", "y", "x"]);
}

#[test]
fn missing_dependencies_are_ignored() {
    let registry = registry(vec![unit("B", 0, &["ghost"]), unit("A", 1, &[])]);
    assert_eq!(order_of(&registry), vec!["B", "A"]);
}

#[test]
fn self_dependencies_are_ignored() {
    let registry = registry(vec![unit("loop", 0, &["loop"])]);
    let schedule = DependencyScheduler::order(registry.active_units());
    assert_eq!(schedule.order, vec!["loop"]);
    assert!(!schedule.has_cycle());
}

#[test]
fn disabling_removes_unit_and_its_edges() {
    let mut registry = registry(vec![
        unit("A", 10, &[]),
        unit("B", 15, &["A"]),
        unit("C", 1, &[]),
        unit("D", 7, &[]),
    ]);
    let before: Vec<String> = order_of(&registry)
        .into_iter()
        .filter(|id| id != "A")
        .collect();
    assert!(registry.disable("A"));
    let after = order_of(&registry);
    assert_eq!(after, vec!["C", "D", "B"]);
    assert_eq!(after, before);
}

#[rstest]
#[case(vec![])]
#[case(vec![("solo", 0, vec![])])]
#[case(vec![("a", 0, vec![]), ("b", 0, vec!["a"]), ("c", 0, vec!["b"])])]
fn every_unit_appears_exactly_once(#[case] entries: Vec<(&str, i32, Vec<&str>)>) {
    let registry = registry(
        entries.iter()
            .map(|(id, priority, requires)| unit(id, *priority, requires))
            .collect(),
    );
    let order = order_of(&registry);
    assert_eq!(order.len(), entries.len());
    let mut sorted = order.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), order.len());
}

#[test]
fn graph_releases_children_once_all_parents_complete() {
    let registry = registry(vec![
        unit("a", 0, &[]),
        unit("b", 0, &[]),
        unit("c", 0, &["a", "b"]),
    ]);
    let mut graph = DependencyScheduler::graph(registry.active_units());
    let mut ready = graph.initial_ready();
    assert_eq!(ready.len(), 2);
    assert_eq!(ready.pop().as_deref(), Some("a"));
    assert!(graph.complete("a").is_empty());
    assert_eq!(graph.complete("b"), vec!["c".to_owned()]);
}
