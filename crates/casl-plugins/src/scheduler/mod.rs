//! Dependency-aware ordering of active plugin units.
//!
//! Units form a graph with an edge `dep -> unit` for every id in
//! `unit.requires`. Ordering is Kahn's algorithm with the ready set drained
//! as a min-heap on `(priority, insertion_index, id)`. Edges to ids outside
//! the scheduled set are dropped with a warning. If a cycle prevents the
//! graph from draining, the remaining units are appended in key order so the
//! schedule always covers every unit exactly once.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::{error, warn};

use crate::unit::PluginUnit;

const SCHEDULER_TARGET: &str = "casl_plugins::scheduler";

/// Deterministic tie-break: `(priority, insertion_index, id)`.
pub type ScheduleKey = (i32, u64, String);

#[derive(Debug, Clone)]
struct Node {
    key: ScheduleKey,
    in_degree: usize,
    children: Vec<String>,
}

/// Min-heap of ready units keyed by [`ScheduleKey`].
#[derive(Debug, Clone, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<Reverse<ScheduleKey>>,
}

impl ReadyQueue {
    /// Adds a ready unit.
    pub fn push(&mut self, key: ScheduleKey) {
        self.heap.push(Reverse(key));
    }

    /// Removes and returns the id with the smallest key.
    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|Reverse((_, _, id))| id)
    }

    /// Number of queued units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Live dependency graph drained by the coordinator.
///
/// ```
/// use casl_plugins::{DependencyGraph, FnHook, HookError, PhaseContext, PluginMetadata, PluginUnit};
///
/// let hook = || FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(()));
/// let a = PluginUnit::in_process(PluginMetadata::new("a").expect("id"), hook());
/// let b = PluginUnit::in_process(PluginMetadata::new("b").expect("id"), hook())
///     .with_requires(["a"]);
///
/// let mut graph = DependencyGraph::build([&a, &b]);
/// let mut ready = graph.initial_ready();
/// assert_eq!(ready.pop().as_deref(), Some("a"));
/// assert_eq!(graph.complete("a"), vec!["b".to_owned()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
}

impl DependencyGraph {
    /// Builds the graph over the given units.
    ///
    /// `requires` entries naming ids outside this set are dropped and logged.
    pub fn build<'a, I>(units: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginUnit>,
    {
        let units: Vec<&PluginUnit> = units.into_iter().collect();
        let mut nodes: BTreeMap<String, Node> = units
            .iter()
            .map(|unit| {
                (
                    unit.id().to_owned(),
                    Node {
                        key: unit.schedule_key(),
                        in_degree: 0,
                        children: Vec::new(),
                    },
                )
            })
            .collect();

        for unit in &units {
            for dependency in unit.requires() {
                if dependency == unit.id() {
                    warn!(
                        target: SCHEDULER_TARGET,
                        plugin = unit.id(),
                        "ignoring self-dependency"
                    );
                    continue;
                }
                let Some(parent) = nodes.get_mut(dependency) else {
                    warn!(
                        target: SCHEDULER_TARGET,
                        plugin = unit.id(),
                        dependency = dependency.as_str(),
                        "missing dependency, edge dropped"
                    );
                    continue;
                };
                parent.children.push(unit.id().to_owned());
                if let Some(node) = nodes.get_mut(unit.id()) {
                    node.in_degree += 1;
                }
            }
        }
        Self { nodes }
    }

    /// Units with no unmet dependencies.
    #[must_use]
    pub fn initial_ready(&self) -> ReadyQueue {
        let mut ready = ReadyQueue::default();
        for node in self.nodes.values().filter(|node| node.in_degree == 0) {
            ready.push(node.key.clone());
        }
        ready
    }

    /// Records completion of `id`, returning dependents that became ready.
    pub fn complete(&mut self, id: &str) -> Vec<String> {
        let children = self
            .nodes
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        let mut released = Vec::new();
        for child in children {
            if let Some(node) = self.nodes.get_mut(&child) {
                if node.in_degree == 0 {
                    continue;
                }
                node.in_degree -= 1;
                if node.in_degree == 0 {
                    released.push(child);
                }
            }
        }
        released
    }

    /// Scheduling key of a unit in the graph.
    #[must_use]
    pub fn key(&self, id: &str) -> Option<&ScheduleKey> {
        self.nodes.get(id).map(|node| &node.key)
    }

    /// Number of units in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids sorted by scheduling key.
    pub(crate) fn ids_by_key<'a>(&self, ids: impl Iterator<Item = &'a String>) -> Vec<String> {
        let mut keys: Vec<&ScheduleKey> = ids.filter_map(|id| self.key(id)).collect();
        keys.sort();
        keys.into_iter().map(|(_, _, id)| id.clone()).collect()
    }
}

/// A computed linear order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Ids in execution order; every scheduled unit appears exactly once.
    pub order: Vec<String>,
    /// Ids appended by cycle remediation, in key order. Empty when acyclic.
    pub cyclic: Vec<String>,
}

impl Schedule {
    /// Whether a cycle had to be remediated.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        !self.cyclic.is_empty()
    }
}

/// Stateless ordering service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyScheduler;

impl DependencyScheduler {
    /// Computes a flat execution order over the given units.
    ///
    /// Inactive units must be filtered out by the caller; edges pointing at
    /// them are then treated as missing dependencies.
    pub fn order<'a, I>(units: I) -> Schedule
    where
        I: IntoIterator<Item = &'a PluginUnit>,
    {
        let mut graph = DependencyGraph::build(units);
        let mut ready = graph.initial_ready();
        let mut order = Vec::with_capacity(graph.len());
        while let Some(id) = ready.pop() {
            for child in graph.complete(&id) {
                if let Some(key) = graph.key(&child) {
                    ready.push(key.clone());
                }
            }
            order.push(id);
        }

        if order.len() == graph.len() {
            return Schedule {
                order,
                cyclic: Vec::new(),
            };
        }

        let visited: std::collections::BTreeSet<&String> = order.iter().collect();
        let remaining: Vec<&String> = graph
            .nodes
            .keys()
            .filter(|id| !visited.contains(id))
            .collect();
        let cyclic = graph.ids_by_key(remaining.into_iter());
        error!(
            target: SCHEDULER_TARGET,
            plugins = ?cyclic,
            "dependency cycle detected, appending remaining plugins by priority"
        );
        order.extend(cyclic.iter().cloned());
        Schedule { order, cyclic }
    }

    /// Builds the live graph for concurrent draining.
    pub fn graph<'a, I>(units: I) -> DependencyGraph
    where
        I: IntoIterator<Item = &'a PluginUnit>,
    {
        DependencyGraph::build(units)
    }
}

#[cfg(test)]
mod tests;
