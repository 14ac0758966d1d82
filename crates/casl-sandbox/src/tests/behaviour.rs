#![cfg(unix)]
//! Behavioural tests for sandbox spawning using `rstest-bdd`.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::error::SandboxError;
use crate::sandbox::SandboxCommand;
use crate::tests::support::TestWorld;

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}

#[given("a sandbox world with a scratch directory")]
fn given_world(#[from(world)] _world: &RefCell<TestWorld>) {}

#[given("the command prints \"{text}\"")]
fn given_printing_command(world: &RefCell<TestWorld>, text: String) {
    let script = format!("printf '%s\\n' '{text}'");
    world.borrow_mut().configure_shell(&script);
}

#[given("the command prints the environment")]
fn given_env_reader(world: &RefCell<TestWorld>) {
    world.borrow_mut().configure_env_reader();
}

#[given("the command sleeps for {seconds} seconds")]
fn given_sleeping_command(world: &RefCell<TestWorld>, seconds: u64) {
    let script = format!("sleep {seconds}; sleep {seconds}");
    world.borrow_mut().configure_shell(&script);
}

#[given("the command uses a relative program path")]
fn given_relative_program(world: &RefCell<TestWorld>) {
    world.borrow_mut().command = Some(SandboxCommand::new("bin/sh"));
}

#[given("environment variable {key} is set")]
fn given_environment_variable(world: &RefCell<TestWorld>, key: String) {
    world.borrow_mut().set_env_var(&key, "present");
}

#[given("the sandbox isolates the environment")]
fn given_isolated_environment(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    world.profile = world.profile.clone().isolate_environment();
}

#[when("the sandbox launches the command")]
fn when_launch(world: &RefCell<TestWorld>) {
    world.borrow_mut().launch();
}

#[when("the command is awaited")]
fn when_awaited(world: &RefCell<TestWorld>) {
    world.borrow_mut().await_child();
}

#[when("the command is terminated")]
fn when_terminated(world: &RefCell<TestWorld>) {
    world.borrow_mut().terminate_child();
}

#[then("the sandboxed process succeeds")]
fn then_process_succeeds(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    let status = world.status.expect("process status missing");
    assert!(status.success(), "sandboxed process should succeed: {status:?}");
}

#[then("stdout contains \"{text}\"")]
fn then_stdout_contains(world: &RefCell<TestWorld>, text: String) {
    let world = world.borrow();
    let output = world.output.as_ref().expect("process output missing");
    let stdout = output.stdout_lossy();
    assert!(
        stdout.contains(text.as_str()),
        "stdout should contain {text}: {stdout}"
    );
}

#[then("stdout does not contain \"{text}\"")]
fn then_stdout_lacks(world: &RefCell<TestWorld>, text: String) {
    let world = world.borrow();
    let output = world.output.as_ref().expect("process output missing");
    let stdout = output.stdout_lossy();
    assert!(
        !stdout.contains(text.as_str()),
        "stdout should not contain {text}: {stdout}"
    );
}

#[then("the process group is gone")]
fn then_group_gone(world: &RefCell<TestWorld>) {
    use std::time::{Duration, Instant};

    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let mut world = world.borrow_mut();
    let reaper = world.reaper.take().expect("reaper missing");
    let started = Instant::now();
    reaper.join().expect("reaper thread panicked");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "reaper should finish shortly after the grace period"
    );
    let pid = world.pid.expect("pid missing");
    let raw = i32::try_from(pid).expect("pid fits in i32");
    assert!(
        kill(Pid::from_raw(raw), None).is_err(),
        "group leader {raw} should have been reaped"
    );
}

#[then("the launch fails because the program is not absolute")]
fn then_launch_rejected(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.launch_error, Some(SandboxError::ProgramNotAbsolute(_))),
        "unexpected launch outcome: {:?}",
        world.launch_error
    );
}

#[scenario(path = "tests/features/sandbox.feature", index = 0)]
fn sandbox_runs_command(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/sandbox.feature", index = 1)]
fn sandbox_isolates_environment(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/sandbox.feature", index = 2)]
fn sandbox_terminates_runaway(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/sandbox.feature", index = 3)]
fn sandbox_rejects_relative_program(world: RefCell<TestWorld>) {
    let _ = world;
}
