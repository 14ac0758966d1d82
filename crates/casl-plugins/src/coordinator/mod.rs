//! Bounded-concurrency driver for a phase run.
//!
//! The coordinator owns the dependency graph, the ready queue and the
//! report. Executions only hand back outcomes through polling, so the report
//! has a single writer. Each unit moves through
//! `Pending -> Ready -> Running -> {Succeeded, Failed}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::context::PhaseContext;
use crate::executor::{Execution, ExecutionPolicy, PluginExecutor, UnitOutcome};
use crate::report::{ExecutionItem, ExecutionReport};
use crate::scheduler::{DependencyGraph, DependencyScheduler, ReadyQueue};
use crate::unit::PluginUnit;

const COORDINATOR_TARGET: &str = "casl_plugins::coordinator";

/// Sleep taken when no unit can make progress.
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Failure text recorded for units stopped by cancellation.
pub const CANCELLED: &str = "cancelled";

/// Cooperative, shareable cancellation flag.
///
/// ```
/// use casl_plugins::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Underlying flag, for signal handlers that set it directly.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Lifecycle of a unit within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Waiting on dependencies.
    Pending,
    /// Queued for a free slot.
    Ready,
    /// Launched.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

/// Drives units to completion with at most `parallelism` running at once.
pub struct ParallelCoordinator<'a> {
    executor: &'a dyn PluginExecutor,
    policy: ExecutionPolicy,
    parallelism: usize,
    cancel: CancelToken,
}

impl<'a> ParallelCoordinator<'a> {
    /// Creates a coordinator; `parallelism` is clamped to at least 1.
    #[must_use]
    pub fn new(executor: &'a dyn PluginExecutor, policy: ExecutionPolicy, parallelism: usize) -> Self {
        Self {
            executor,
            policy,
            parallelism: parallelism.max(1),
            cancel: CancelToken::new(),
        }
    }

    /// Uses `cancel` as the run's cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the run will execute units one at a time.
    #[must_use]
    pub const fn is_sequential(&self) -> bool {
        self.parallelism <= 1 || !self.policy.sandbox
    }

    /// Executes every unit and returns the report.
    ///
    /// Units must be active and unique; `requires` edges to ids outside the
    /// set are dropped. Runs sequentially in scheduler order when
    /// parallelism is 1 or sandboxing is disabled.
    pub fn run(&self, units: &[&PluginUnit], context: &Arc<PhaseContext>) -> ExecutionReport {
        let mut report = ExecutionReport::new(context.phase());
        if units.is_empty() {
            info!(target: COORDINATOR_TARGET, "no active plugins");
            return report;
        }
        let by_id: BTreeMap<&str, &PluginUnit> = units.iter().map(|unit| (unit.id(), *unit)).collect();
        if self.is_sequential() {
            self.run_sequential(&by_id, units, context, &mut report);
        } else {
            self.run_parallel(&by_id, units, context, &mut report);
        }
        report
    }

    fn run_sequential(
        &self,
        by_id: &BTreeMap<&str, &PluginUnit>,
        units: &[&PluginUnit],
        context: &Arc<PhaseContext>,
        report: &mut ExecutionReport,
    ) {
        let schedule = DependencyScheduler::order(units.iter().copied());
        debug!(
            target: COORDINATOR_TARGET,
            order = ?schedule.order,
            "running plugins sequentially"
        );
        let mut remaining = schedule.order.into_iter();
        while let Some(id) = remaining.next() {
            if self.cancel.is_cancelled() {
                let mut not_run = vec![id];
                not_run.extend(remaining);
                Self::note_cancelled(report, not_run);
                return;
            }
            let Some(unit) = by_id.get(id.as_str()) else {
                continue;
            };
            let mut execution = self.launch(unit, context);
            let outcome = loop {
                if let Some(outcome) = execution.poll() {
                    break outcome;
                }
                if self.cancel.is_cancelled() {
                    break execution.cancel(CANCELLED);
                }
                thread::sleep(IDLE_SLEEP);
            };
            report.add(Self::record(unit, &outcome));
        }
    }

    fn run_parallel(
        &self,
        by_id: &BTreeMap<&str, &PluginUnit>,
        units: &[&PluginUnit],
        context: &Arc<PhaseContext>,
        report: &mut ExecutionReport,
    ) {
        let mut graph = DependencyScheduler::graph(units.iter().copied());
        let mut states: BTreeMap<String, UnitState> = by_id
            .keys()
            .map(|id| ((*id).to_owned(), UnitState::Pending))
            .collect();
        let mut ready = ReadyQueue::default();
        let mut initial = graph.initial_ready();
        while let Some(id) = initial.pop() {
            Self::make_ready(&graph, &mut states, &mut ready, &id);
        }

        debug!(
            target: COORDINATOR_TARGET,
            parallelism = self.parallelism,
            plugins = units.len(),
            "running plugins in parallel"
        );
        let mut running: Vec<(String, Box<dyn Execution>)> = Vec::new();
        let mut stalled_once = false;
        loop {
            if self.cancel.is_cancelled() {
                for (id, execution) in running.drain(..) {
                    let outcome = execution.cancel(CANCELLED);
                    if let Some(unit) = by_id.get(id.as_str()) {
                        report.add(Self::record(unit, &outcome));
                    }
                }
                let not_run = graph.ids_by_key(
                    states
                        .iter()
                        .filter(|(_, state)| matches!(state, UnitState::Pending | UnitState::Ready))
                        .map(|(id, _)| id),
                );
                Self::note_cancelled(report, not_run);
                return;
            }

            let mut launched = false;
            while running.len() < self.parallelism {
                let Some(id) = ready.pop() else { break };
                let Some(unit) = by_id.get(id.as_str()) else {
                    continue;
                };
                states.insert(id.clone(), UnitState::Running);
                running.push((id, self.launch(unit, context)));
                launched = true;
            }

            let mut finished = Vec::new();
            let mut still_running = Vec::with_capacity(running.len());
            for (id, mut execution) in running.drain(..) {
                match execution.poll() {
                    Some(outcome) => finished.push((id, outcome)),
                    None => still_running.push((id, execution)),
                }
            }
            running = still_running;

            for (id, outcome) in &finished {
                let state = if outcome.success {
                    UnitState::Succeeded
                } else {
                    UnitState::Failed
                };
                states.insert(id.clone(), state);
                if let Some(unit) = by_id.get(id.as_str()) {
                    report.add(Self::record(unit, outcome));
                }
                for child in graph.complete(id) {
                    Self::make_ready(&graph, &mut states, &mut ready, &child);
                }
            }

            if running.is_empty() && ready.is_empty() {
                let pending = graph.ids_by_key(
                    states
                        .iter()
                        .filter(|(_, state)| **state == UnitState::Pending)
                        .map(|(id, _)| id),
                );
                if pending.is_empty() {
                    return;
                }
                if !stalled_once {
                    error!(
                        target: COORDINATOR_TARGET,
                        plugins = ?pending,
                        "dependency cycle detected, releasing remaining plugins by priority"
                    );
                    stalled_once = true;
                }
                for id in pending {
                    Self::make_ready(&graph, &mut states, &mut ready, &id);
                }
                continue;
            }

            if !launched && finished.is_empty() {
                thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn make_ready(
        graph: &DependencyGraph,
        states: &mut BTreeMap<String, UnitState>,
        ready: &mut ReadyQueue,
        id: &str,
    ) {
        let Some(state) = states.get_mut(id) else {
            return;
        };
        if *state != UnitState::Pending {
            return;
        }
        if let Some(key) = graph.key(id) {
            *state = UnitState::Ready;
            ready.push(key.clone());
        }
    }

    fn launch(&self, unit: &PluginUnit, context: &Arc<PhaseContext>) -> Box<dyn Execution> {
        debug!(target: COORDINATOR_TARGET, plugin = unit.id(), "launching plugin");
        self.executor.launch(unit, context, &self.policy)
    }

    fn record(unit: &PluginUnit, outcome: &UnitOutcome) -> ExecutionItem {
        let duration_ms = outcome.duration.as_secs_f64() * 1000.0;
        if outcome.success {
            info!(
                target: COORDINATOR_TARGET,
                plugin = unit.id(),
                duration_ms,
                "plugin succeeded"
            );
            ExecutionItem::succeeded(unit.metadata(), outcome.duration)
        } else {
            warn!(
                target: COORDINATOR_TARGET,
                plugin = unit.id(),
                duration_ms,
                error = outcome.error.as_str(),
                "plugin failed"
            );
            ExecutionItem::failed(unit.metadata(), outcome.duration, &outcome.error)
        }
    }

    fn note_cancelled(report: &mut ExecutionReport, not_run: Vec<String>) {
        warn!(
            target: COORDINATOR_TARGET,
            not_run = not_run.len(),
            "run cancelled, no further plugins will be launched"
        );
        report.mark_cancelled(not_run);
    }
}

impl std::fmt::Debug for ParallelCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCoordinator")
            .field("policy", &self.policy)
            .field("parallelism", &self.parallelism)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
