//! Unit tests for the parallel coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use casl_config::Phase;
use rstest::{fixture, rstest};

use super::*;
use crate::executor::SandboxedExecutor;
use crate::tests::support::{Journal, shell_unit};

const QUICK: Duration = Duration::from_millis(20);

#[fixture]
fn context() -> Arc<PhaseContext> {
    Arc::new(PhaseContext::builder(Phase::Pre, std::env::temp_dir()).build())
}

fn coordinator(executor: &SandboxedExecutor, parallelism: usize) -> ParallelCoordinator<'_> {
    ParallelCoordinator::new(executor, ExecutionPolicy::default(), parallelism)
}

fn drain_graph(
    coordinator: &ParallelCoordinator<'_>,
    units: &[&PluginUnit],
    context: &Arc<PhaseContext>,
) -> ExecutionReport {
    let by_id: BTreeMap<&str, &PluginUnit> = units.iter().map(|unit| (unit.id(), *unit)).collect();
    let mut report = ExecutionReport::new(context.phase());
    coordinator.run_parallel(&by_id, units, context, &mut report);
    report
}

fn ids(report: &ExecutionReport) -> Vec<&str> {
    report.items().iter().map(|item| item.plugin_id.as_str()).collect()
}

#[rstest]
fn priority_never_overrides_requires(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let a = journal.unit("A", QUICK, false).with_priority(10);
    let b = journal.unit("B", QUICK, false).with_priority(5).with_requires(["A"]);
    let c = journal.unit("C", QUICK, false).with_priority(1);
    let executor = SandboxedExecutor::new();

    let report = coordinator(&executor, 1).run(&[&a, &b, &c], &context);

    assert_eq!(journal.starts(), vec!["C", "A", "B"]);
    assert_eq!(ids(&report), vec!["C", "A", "B"]);
    assert!(report.ok());
}

#[rstest]
fn single_slot_graph_draining_matches_the_sequential_order(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let units = [
        journal.unit("fmt", QUICK, false).with_priority(3),
        journal.unit("gen", QUICK, false).with_priority(2).with_requires(["clean"]),
        journal.unit("clean", QUICK, false).with_priority(0),
        journal.unit("lint", QUICK, false).with_priority(1).with_requires(["gen", "fmt"]),
        journal.unit("zip", QUICK, false).with_priority(1),
    ];
    let refs: Vec<&PluginUnit> = units.iter().collect();
    let executor = SandboxedExecutor::new();

    drain_graph(&coordinator(&executor, 1), &refs, &context);

    let expected = DependencyScheduler::order(refs.iter().copied()).order;
    assert_eq!(journal.starts(), expected);
}

#[rstest]
fn dependents_start_after_their_dependencies_finish(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let slow = journal.unit("slow", Duration::from_millis(150), false);
    let after = journal.unit("after", QUICK, false).with_requires(["slow"]);
    let free = journal.unit("free", QUICK, false);
    let executor = SandboxedExecutor::new();

    let report = coordinator(&executor, 4).run(&[&slow, &after, &free], &context);

    assert_eq!(report.len(), 3);
    let finished = journal.position("end:slow").expect("slow finished");
    let started = journal.position("start:after").expect("after started");
    assert!(finished < started, "events: {:?}", journal.events());
}

#[rstest]
fn independent_units_run_concurrently(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let units: Vec<PluginUnit> = ["a", "b", "c"]
        .into_iter()
        .map(|id| journal.unit(id, Duration::from_millis(300), false))
        .collect();
    let refs: Vec<&PluginUnit> = units.iter().collect();
    let executor = SandboxedExecutor::new();

    let started = Instant::now();
    let report = coordinator(&executor, 3).run(&refs, &context);

    assert!(report.ok());
    assert!(started.elapsed() < Duration::from_millis(800));
}

#[rstest]
#[case(1)]
#[case(3)]
fn cycles_still_run_every_unit_once(context: Arc<PhaseContext>, #[case] parallelism: usize) {
    let journal = Journal::default();
    let a = journal.unit("A", QUICK, false).with_priority(1).with_requires(["B"]);
    let b = journal.unit("B", QUICK, false).with_priority(2).with_requires(["A"]);
    let tail = journal.unit("tail", QUICK, false).with_requires(["B"]);
    let executor = SandboxedExecutor::new();
    let coordinator = coordinator(&executor, parallelism);

    let report = drain_graph(&coordinator, &[&a, &b, &tail], &context);

    let mut seen = ids(&report);
    seen.sort_unstable();
    assert_eq!(seen, vec!["A", "B", "tail"]);
}

#[rstest]
fn failures_do_not_block_dependents(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let first = journal.unit("first", QUICK, true);
    let second = journal.unit("second", QUICK, false).with_requires(["first"]);
    let executor = SandboxedExecutor::new();

    let report = coordinator(&executor, 2).run(&[&first, &second], &context);

    assert!(!report.ok());
    assert_eq!(ids(&report), vec!["first", "second"]);
    assert_eq!(
        report.failed().map(|item| item.error.as_str()).collect::<Vec<_>>(),
        vec!["first failed"]
    );
}

#[rstest]
fn cancellation_before_launch_runs_nothing(context: Arc<PhaseContext>) {
    let journal = Journal::default();
    let a = journal.unit("a", QUICK, false).with_priority(2);
    let b = journal.unit("b", QUICK, false).with_priority(1);
    let executor = SandboxedExecutor::new();
    let token = CancelToken::new();
    token.cancel();

    let report = coordinator(&executor, 1)
        .with_cancel(token)
        .run(&[&a, &b], &context);

    assert!(report.is_empty());
    assert!(report.is_cancelled());
    assert_eq!(report.not_run(), ["b", "a"]);
    assert!(journal.starts().is_empty());
}

#[cfg(unix)]
#[rstest]
fn cancellation_stops_running_processes_promptly(context: Arc<PhaseContext>) {
    let stuck = shell_unit("stuck", "sleep 30");
    let next = shell_unit("next", "true").with_requires(["stuck"]);
    let executor = SandboxedExecutor::new();
    let token = CancelToken::new();
    let trigger = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trigger.cancel();
    });

    let started = Instant::now();
    let report = coordinator(&executor, 2)
        .with_cancel(token)
        .run(&[&stuck, &next], &context);
    canceller.join().expect("canceller thread");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(report.is_cancelled());
    assert_eq!(report.failed().map(|item| item.error.as_str()).collect::<Vec<_>>(), vec![
        CANCELLED
    ]);
    assert_eq!(report.not_run(), ["next"]);
}

#[test]
fn disabling_the_sandbox_forces_sequential_runs() {
    let executor = SandboxedExecutor::new();
    let policy = ExecutionPolicy {
        sandbox: false,
        ..ExecutionPolicy::default()
    };
    assert!(ParallelCoordinator::new(&executor, policy, 8).is_sequential());
    assert!(coordinator(&executor, 0).is_sequential());
    assert!(!coordinator(&executor, 2).is_sequential());
}
