//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use suitebridge::config::{Options, OptionsOverrides, RunnerConfig};
use suitebridge::error::{BridgeError, Phase, Result};
use suitebridge::runner::{Runner, RunnerContext};

/// Runner that records every phase instead of launching anything
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Vec<Phase>,
    /// Suite count seen by each run-tests call
    pub run_sizes: Vec<usize>,
    pub always_fail: HashSet<Phase>,
    pub fail_once: Option<Phase>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(phase: Phase) -> Self {
        Self {
            always_fail: HashSet::from([phase]),
            ..Default::default()
        }
    }

    pub fn failing_once(phase: Phase) -> Self {
        Self {
            fail_once: Some(phase),
            ..Default::default()
        }
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.calls.iter().filter(|p| **p == phase).count()
    }

    fn record(&mut self, phase: Phase) -> Result<()> {
        self.calls.push(phase);
        if self.always_fail.contains(&phase) {
            return Err(BridgeError::phase(phase, "scripted failure"));
        }
        if self.fail_once == Some(phase) {
            self.fail_once = None;
            return Err(BridgeError::phase(phase, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    async fn setup_overrides(&mut self, _ctx: &RunnerContext) -> Result<()> {
        self.record(Phase::SetupOverrides)
    }

    async fn load_plugins(&mut self, _ctx: &RunnerContext) -> Result<()> {
        self.record(Phase::LoadPlugins)
    }

    async fn configure(&mut self, _ctx: &RunnerContext) -> Result<()> {
        self.record(Phase::Configure)
    }

    async fn prepare(&mut self, _ctx: &RunnerContext) -> Result<()> {
        self.record(Phase::Prepare)
    }

    async fn run_tests(&mut self, ctx: &RunnerContext) -> Result<()> {
        self.run_sizes.push(ctx.suites.len());
        self.record(Phase::RunTests)
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Phase::Close)
    }
}

pub fn default_config(root: &Path) -> RunnerConfig {
    RunnerConfig::defaults(&Options::resolve(root, OptionsOverrides::default()))
}

/// Write a module at `rel` under `root`, creating parent directories
pub fn write_module(root: &Path, rel: &str, body: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, body).unwrap();
    path
}
