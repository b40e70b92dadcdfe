//! Integration tests for the execution lifecycle
//!
//! Scripted build-cycle sequences against a recording runner, checking which
//! phases run on which cycle and when the runner is released.

mod common;

use common::{default_config, RecordingRunner};
use std::path::{Path, PathBuf};
use suitebridge::controller::{ExecutionLifecycleController, LifecycleState};
use suitebridge::error::{BridgeError, Phase};

fn controller(runner: RecordingRunner) -> ExecutionLifecycleController<RecordingRunner> {
    ExecutionLifecycleController::new(runner, default_config(Path::new("/project")))
}

fn suite(n: usize) -> PathBuf {
    PathBuf::from(format!("__build_tests/SuiteBridge-{:016x}.html", n))
}

#[tokio::test]
async fn test_three_one_shot_cycles() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors: Vec<BridgeError> = Vec::new();

    controller.before_run();
    assert_eq!(controller.state(), LifecycleState::AwaitingFirstCycle);

    for n in 0..3 {
        controller.add_suite(suite(n));
        let outcome = controller.complete_cycle(&mut errors).await;
        assert_eq!(outcome.cycle, n as u64 + 1);
        assert!(outcome.ran_tests);
        assert_eq!(outcome.bootstrapped, n == 0);
        assert_eq!(controller.state(), LifecycleState::Running);
    }

    let runner = controller.runner();
    for phase in Phase::BOOTSTRAP {
        assert_eq!(runner.count(phase), 1, "{} should run once", phase);
    }
    assert_eq!(runner.count(Phase::RunTests), 3);
    assert_eq!(runner.count(Phase::Close), 0);

    assert!(controller.finish().await);
    assert_eq!(controller.state(), LifecycleState::Draining);
    assert_eq!(controller.runner().count(Phase::Close), 1);
    assert_eq!(controller.runner().calls.last(), Some(&Phase::Close));
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_bootstrap_order_then_run() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.add_suite(suite(1));
    controller.complete_cycle(&mut errors).await;

    assert_eq!(
        controller.runner().calls,
        vec![
            Phase::SetupOverrides,
            Phase::LoadPlugins,
            Phase::Configure,
            Phase::Prepare,
            Phase::RunTests
        ]
    );
}

#[tokio::test]
async fn test_watch_mode_never_cleans_up() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    for n in 0..3 {
        controller.watch_run();
        controller.add_suite(suite(n));
        controller.complete_cycle(&mut errors).await;
        assert!(!controller.finish().await);
    }

    assert!(controller.run_state().watch_mode);
    assert_eq!(controller.run_state().run_count, 3);
    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(controller.runner().count(Phase::RunTests), 3);
    assert_eq!(controller.runner().count(Phase::Close), 0);
}

#[tokio::test]
async fn test_run_tests_sees_full_suite_history() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.watch_run();
    controller.add_suite(suite(1));
    controller.add_suite(suite(2));
    controller.complete_cycle(&mut errors).await;

    // Rebuild of a known suite plus one new suite
    controller.add_suite(suite(2));
    controller.add_suite(suite(3));
    controller.complete_cycle(&mut errors).await;

    // Nothing new
    controller.complete_cycle(&mut errors).await;

    assert_eq!(controller.runner().run_sizes, vec![2, 3, 3]);
}

#[tokio::test]
async fn test_no_suites_stays_idle() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.before_run();
    let outcome = controller.complete_cycle(&mut errors).await;

    assert!(outcome.plan.is_empty());
    assert!(!outcome.ran_tests);
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(controller.runner().calls.is_empty());
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_bootstrap_deferred_to_first_cycle_with_suites() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.watch_run();
    controller.complete_cycle(&mut errors).await;
    assert!(controller.runner().calls.is_empty());

    controller.add_suite(suite(1));
    let outcome = controller.complete_cycle(&mut errors).await;
    assert_eq!(outcome.cycle, 2);
    assert!(outcome.bootstrapped);
    assert_eq!(controller.runner().count(Phase::Prepare), 1);
    assert_eq!(controller.runner().count(Phase::RunTests), 1);
}

#[tokio::test]
async fn test_run_tests_failure_is_collected() {
    let mut controller = controller(RecordingRunner::failing(Phase::RunTests));
    let mut errors = Vec::new();

    controller.before_run();
    controller.add_suite(suite(1));
    let outcome = controller.complete_cycle(&mut errors).await;

    assert_eq!(outcome.failures, 1);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        BridgeError::Phase {
            phase: Phase::RunTests,
            ..
        }
    ));
    assert_eq!(controller.state(), LifecycleState::Running);

    // Cleanup still happens after a failed run
    assert!(controller.finish().await);
    assert_eq!(controller.runner().count(Phase::Close), 1);
}

#[tokio::test]
async fn test_bootstrap_failure_retried_next_cycle() {
    let mut controller = controller(RecordingRunner::failing_once(Phase::Configure));
    let mut errors = Vec::new();

    controller.watch_run();
    controller.add_suite(suite(1));
    let first = controller.complete_cycle(&mut errors).await;
    assert!(!first.bootstrapped);
    assert!(!first.ran_tests);
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert_eq!(controller.runner().count(Phase::Prepare), 0);
    assert_eq!(errors.len(), 1);

    let second = controller.complete_cycle(&mut errors).await;
    assert!(second.bootstrapped);
    assert!(second.ran_tests);
    assert_eq!(controller.runner().count(Phase::SetupOverrides), 2);
    assert_eq!(controller.runner().count(Phase::RunTests), 1);
    assert_eq!(controller.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_drained_controller_is_inert() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.before_run();
    controller.add_suite(suite(1));
    controller.complete_cycle(&mut errors).await;
    assert!(controller.finish().await);

    let outcome = controller.complete_cycle(&mut errors).await;
    assert!(!outcome.ran_tests);
    assert!(!controller.finish().await);
    assert_eq!(controller.runner().count(Phase::RunTests), 1);
    assert_eq!(controller.runner().count(Phase::Close), 1);
}

#[tokio::test]
async fn test_shutdown_releases_in_watch_mode() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();

    controller.watch_run();
    controller.add_suite(suite(1));
    controller.complete_cycle(&mut errors).await;

    assert!(controller.shutdown().await);
    assert!(!controller.shutdown().await);
    assert_eq!(controller.runner().count(Phase::Close), 1);
}

#[tokio::test]
async fn test_suite_count_is_monotonic() {
    let mut controller = controller(RecordingRunner::new());
    let mut errors = Vec::new();
    let mut previous = 0;

    controller.watch_run();
    for batch in [vec![1, 2], vec![2], vec![], vec![3, 1, 4]] {
        for n in batch {
            controller.add_suite(suite(n));
        }
        let outcome = controller.complete_cycle(&mut errors).await;
        assert!(outcome.suites >= previous);
        previous = outcome.suites;
    }
    assert_eq!(previous, 4);
}
