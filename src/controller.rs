//! Execution Lifecycle Controller
//!
//! Drives the runner across build cycles. The first cycle that has suites runs
//! the four bootstrap phases and then run-tests; every later cycle runs
//! run-tests alone against the full accumulated suite set. A one-shot
//! pipeline drains after its final cycle and releases the runner; a watch
//! pipeline never does while it is alive.
//!
//! ```text
//!   Idle ──start──▶ AwaitingFirstCycle ──emit, suites──▶ Bootstrapping ──ok──▶ Running
//!    ▲                      │                                 │                  │
//!    └──── emit, no suites ─┘◀──────────── bootstrap failed ──┘      done (one-shot)
//!                                                                                ▼
//!                                                                            Draining
//! ```

use crate::bundler::BuildEvent;
use crate::config::RunnerConfig;
use crate::error::{BridgeError, Phase, Result};
use crate::lifecycle::CleanupCoordinator;
use crate::runner::{run_phase, Runner, RunnerContext};
use crate::suite::SuiteSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    AwaitingFirstCycle,
    Bootstrapping,
    Running,
    Draining,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    /// Completed build-cycle callbacks
    pub run_count: u64,
    /// Set by the first watch-triggered cycle, never cleared
    pub watch_mode: bool,
}

impl RunState {
    /// 1-indexed sequence number of the cycle currently in flight
    pub fn current_cycle(&self) -> u64 {
        self.run_count + 1
    }
}

/// Phases selected for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CyclePlan {
    pub bootstrap: bool,
    pub run_tests: bool,
}

impl CyclePlan {
    pub fn is_empty(&self) -> bool {
        !self.bootstrap && !self.run_tests
    }
}

/// Pick the phases for the cycle in flight.
///
/// Nothing runs without suites or once drained. Bootstrap runs until it has
/// succeeded once, which is cycle 1 unless cycle 1 had no suites or failed.
/// Every cycle with suites runs tests, the bootstrap cycle included.
pub fn plan_cycle(state: LifecycleState, suite_count: usize) -> CyclePlan {
    if suite_count == 0 || state == LifecycleState::Draining {
        return CyclePlan::default();
    }
    CyclePlan {
        bootstrap: state != LifecycleState::Running,
        run_tests: true,
    }
}

/// State change caused by a pipeline hook. Emitted cycles are handled by `complete_cycle`.
pub fn next_state(state: LifecycleState, event: &BuildEvent, run: RunState) -> LifecycleState {
    match (state, event) {
        (LifecycleState::Draining, _) => LifecycleState::Draining,
        (LifecycleState::Idle, BuildEvent::BeforeRun | BuildEvent::WatchRun) => {
            LifecycleState::AwaitingFirstCycle
        }
        (_, BuildEvent::Done) if !run.watch_mode => LifecycleState::Draining,
        (state, _) => state,
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub plan: CyclePlan,
    pub bootstrapped: bool,
    pub ran_tests: bool,
    pub suites: usize,
    pub failures: usize,
}

impl CycleOutcome {
    fn skipped(cycle: u64, suites: usize) -> Self {
        Self {
            cycle,
            plan: CyclePlan::default(),
            bootstrapped: false,
            ran_tests: false,
            suites,
            failures: 0,
        }
    }
}

/// Owns the run state, the suite set and the runner.
///
/// Callers must await each method before calling the next one; the bundler
/// never has two cycle callbacks in flight.
pub struct ExecutionLifecycleController<R: Runner> {
    runner: R,
    context: RunnerContext,
    state: LifecycleState,
    run: RunState,
    cleanup: CleanupCoordinator,
}

impl<R: Runner> ExecutionLifecycleController<R> {
    pub fn new(runner: R, config: RunnerConfig) -> Self {
        Self {
            runner,
            context: RunnerContext::new(config),
            state: LifecycleState::Idle,
            run: RunState::default(),
            cleanup: CleanupCoordinator::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn suites(&self) -> &SuiteSet {
        &self.context.suites
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// No further cycles are processed once drained.
    pub fn is_inert(&self) -> bool {
        self.state == LifecycleState::Draining
    }

    pub fn before_run(&mut self) {
        self.state = next_state(self.state, &BuildEvent::BeforeRun, self.run);
    }

    pub fn watch_run(&mut self) {
        self.run.watch_mode = true;
        self.state = next_state(self.state, &BuildEvent::WatchRun, self.run);
    }

    /// Record a generated suite. Returns `false` if it was already known.
    pub fn add_suite(&mut self, suite: PathBuf) -> bool {
        self.context.suites.insert(suite)
    }

    /// Count a cycle whose suites could not be generated, without running any phase.
    pub fn abandon_cycle(&mut self) -> CycleOutcome {
        let outcome = CycleOutcome::skipped(self.run.current_cycle(), self.context.suites.len());
        if !self.is_inert() {
            self.run.run_count += 1;
        }
        outcome
    }

    /// Run the phases selected for this cycle. Phase failures go to `errors`.
    pub async fn complete_cycle(&mut self, errors: &mut Vec<BridgeError>) -> CycleOutcome {
        let cycle = self.run.current_cycle();
        let mut outcome = CycleOutcome::skipped(cycle, self.context.suites.len());

        if self.is_inert() {
            tracing::warn!("ignoring build cycle {}: pipeline already drained", cycle);
            return outcome;
        }

        let plan = plan_cycle(self.state, self.context.suites.len());
        outcome.plan = plan;

        if plan.is_empty() {
            tracing::warn!("no tests were supplied to the runner");
            self.state = LifecycleState::Idle;
        }

        if plan.bootstrap {
            self.state = LifecycleState::Bootstrapping;
            tracing::info!("cycle {}: bootstrapping runner", cycle);
            match self.bootstrap().await {
                Ok(()) => {
                    self.state = LifecycleState::Running;
                    outcome.bootstrapped = true;
                }
                Err(e) => {
                    tracing::warn!("cycle {}: {}", cycle, e);
                    errors.push(e);
                    outcome.failures += 1;
                    self.state = LifecycleState::Idle;
                }
            }
        }

        if plan.run_tests && self.state == LifecycleState::Running {
            tracing::info!(
                "cycle {}: running {} suites",
                cycle,
                self.context.suites.len()
            );
            outcome.ran_tests = true;
            if let Err(e) = run_phase(&mut self.runner, Phase::RunTests, &self.context).await {
                tracing::warn!("cycle {}: {}", cycle, e);
                errors.push(e);
                outcome.failures += 1;
            }
        }

        self.run.run_count += 1;
        outcome
    }

    async fn bootstrap(&mut self) -> Result<()> {
        for phase in Phase::BOOTSTRAP {
            tracing::debug!("phase {}", phase);
            run_phase(&mut self.runner, phase, &self.context).await?;
        }
        Ok(())
    }

    /// One-shot completion: drain and release the runner. A no-op in watch mode.
    ///
    /// Returns `true` if this call released the runner.
    pub async fn finish(&mut self) -> bool {
        self.state = next_state(self.state, &BuildEvent::Done, self.run);
        if !self.is_inert() {
            tracing::debug!("watch mode: keeping runner alive");
            return false;
        }
        self.cleanup.release(&mut self.runner).await
    }

    /// Release the runner because the process is going away, in any mode.
    pub async fn shutdown(&mut self) -> bool {
        self.state = LifecycleState::Draining;
        self.cleanup.release(&mut self.runner).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(run_count: u64, watch_mode: bool) -> RunState {
        RunState {
            run_count,
            watch_mode,
        }
    }

    #[test]
    fn test_plan_first_cycle_bootstraps_and_runs() {
        let plan = plan_cycle(LifecycleState::AwaitingFirstCycle, 2);
        assert_eq!(
            plan,
            CyclePlan {
                bootstrap: true,
                run_tests: true
            }
        );
    }

    #[test]
    fn test_plan_later_cycles_run_only() {
        let plan = plan_cycle(LifecycleState::Running, 2);
        assert!(!plan.bootstrap);
        assert!(plan.run_tests);
    }

    #[test]
    fn test_plan_runs_tests_whenever_suites_exist() {
        for state in [
            LifecycleState::Idle,
            LifecycleState::AwaitingFirstCycle,
            LifecycleState::Bootstrapping,
            LifecycleState::Running,
        ] {
            assert!(plan_cycle(state, 1).run_tests, "{:?}", state);
        }
    }

    #[test]
    fn test_plan_without_suites_is_empty() {
        assert!(plan_cycle(LifecycleState::Idle, 0).is_empty());
        assert!(plan_cycle(LifecycleState::AwaitingFirstCycle, 0).is_empty());
    }

    #[test]
    fn test_plan_after_drain_is_empty() {
        assert!(plan_cycle(LifecycleState::Draining, 5).is_empty());
    }

    #[test]
    fn test_plan_is_pure() {
        let a = plan_cycle(LifecycleState::Running, 3);
        let b = plan_cycle(LifecycleState::Running, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_next_state_start_events() {
        assert_eq!(
            next_state(LifecycleState::Idle, &BuildEvent::BeforeRun, run(0, false)),
            LifecycleState::AwaitingFirstCycle
        );
        assert_eq!(
            next_state(LifecycleState::Idle, &BuildEvent::WatchRun, run(0, true)),
            LifecycleState::AwaitingFirstCycle
        );
        assert_eq!(
            next_state(LifecycleState::Running, &BuildEvent::WatchRun, run(2, true)),
            LifecycleState::Running
        );
    }

    #[test]
    fn test_next_state_done() {
        assert_eq!(
            next_state(LifecycleState::Running, &BuildEvent::Done, run(1, false)),
            LifecycleState::Draining
        );
        assert_eq!(
            next_state(LifecycleState::Running, &BuildEvent::Done, run(1, true)),
            LifecycleState::Running
        );
        assert_eq!(
            next_state(LifecycleState::Draining, &BuildEvent::WatchRun, run(1, true)),
            LifecycleState::Draining
        );
    }

    #[test]
    fn test_current_cycle_is_one_indexed() {
        assert_eq!(RunState::default().current_cycle(), 1);
        assert_eq!(run(2, false).current_cycle(), 3);
    }
}
