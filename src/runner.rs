//! Runner Protocol
//!
//! The external test runner is driven through four one-time bootstrap phases
//! and a repeatable run-tests phase, plus a final close. `CommandRunner`
//! drives a command-line runner as a child process.

use crate::config::RunnerConfig;
use crate::error::{BridgeError, Phase, Result};
use crate::lifecycle::ProcessTracker;
use crate::suite::SuiteSet;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const GENERATED_CONFIG: &str = "wct.generated.json";

/// State shared with the runner on every phase
#[derive(Debug, Clone)]
pub struct RunnerContext {
    pub config: RunnerConfig,
    /// Every suite known so far, relative to `config.root`
    pub suites: SuiteSet,
}

impl RunnerContext {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            suites: SuiteSet::new(),
        }
    }
}

/// Test runner phases, each awaited to completion before the next starts.
#[async_trait]
pub trait Runner: Send {
    async fn setup_overrides(&mut self, ctx: &RunnerContext) -> Result<()>;

    async fn load_plugins(&mut self, ctx: &RunnerContext) -> Result<()>;

    async fn configure(&mut self, ctx: &RunnerContext) -> Result<()>;

    async fn prepare(&mut self, ctx: &RunnerContext) -> Result<()>;

    async fn run_tests(&mut self, ctx: &RunnerContext) -> Result<()>;

    /// Release connections, processes and timers held by the runner
    async fn close(&mut self) -> Result<()>;
}

/// Dispatch a non-close phase by name.
pub async fn run_phase<R: Runner + ?Sized>(
    runner: &mut R,
    phase: Phase,
    ctx: &RunnerContext,
) -> Result<()> {
    match phase {
        Phase::SetupOverrides => runner.setup_overrides(ctx).await,
        Phase::LoadPlugins => runner.load_plugins(ctx).await,
        Phase::Configure => runner.configure(ctx).await,
        Phase::Prepare => runner.prepare(ctx).await,
        Phase::RunTests => runner.run_tests(ctx).await,
        Phase::Close => runner.close().await,
    }
}

/// Runs a command-line test runner (`npx wct` by default).
///
/// The merged config plus the suite list is written to
/// `<output>/wct.generated.json` and handed over with `--config-file`.
pub struct CommandRunner {
    output: PathBuf,
    generated: Option<PathBuf>,
    plugins: Vec<String>,
    program: Option<(String, Vec<String>)>,
    keep_generated: bool,
    processes: ProcessTracker,
}

impl CommandRunner {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            generated: None,
            plugins: Vec::new(),
            program: None,
            keep_generated: false,
            processes: ProcessTracker::new(),
        }
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn generated_config(&self) -> Option<&Path> {
        self.generated.as_deref()
    }

    fn write_generated(&mut self, ctx: &RunnerContext) -> Result<PathBuf> {
        let path = self.output.join(GENERATED_CONFIG);
        let mut value = serde_json::to_value(&ctx.config)
            .map_err(|e| BridgeError::phase(Phase::SetupOverrides, e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "suites".to_string(),
                serde_json::to_value(ctx.suites.as_slice())
                    .map_err(|e| BridgeError::phase(Phase::SetupOverrides, e.to_string()))?,
            );
        }
        let json = serde_json::to_string_pretty(&value)
            .map_err(|e| BridgeError::phase(Phase::SetupOverrides, e.to_string()))?;
        fs::write(&path, json).map_err(|e| BridgeError::io(&path, e))?;
        self.generated = Some(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl Runner for CommandRunner {
    async fn setup_overrides(&mut self, ctx: &RunnerContext) -> Result<()> {
        self.keep_generated = ctx.config.skip_cleanup || ctx.config.persistent;
        let path = self.write_generated(ctx)?;
        tracing::debug!("runner config written to {}", path.display());
        Ok(())
    }

    async fn load_plugins(&mut self, ctx: &RunnerContext) -> Result<()> {
        self.plugins = ctx.config.plugins.enabled();
        tracing::info!("runner plugins: {}", self.plugins.join(", "));
        Ok(())
    }

    async fn configure(&mut self, ctx: &RunnerContext) -> Result<()> {
        let root = &ctx.config.root;
        if !root.is_dir() {
            return Err(BridgeError::phase(
                Phase::Configure,
                format!("runner root {} is not a directory", root.display()),
            ));
        }
        if let Some(missing) = ctx.suites.as_slice().iter().find(|s| !root.join(s).is_file()) {
            return Err(BridgeError::phase(
                Phase::Configure,
                format!("suite {} does not exist", missing.display()),
            ));
        }
        Ok(())
    }

    async fn prepare(&mut self, ctx: &RunnerContext) -> Result<()> {
        let mut command = ctx.config.command.iter().cloned();
        let program = command
            .next()
            .ok_or_else(|| BridgeError::phase(Phase::Prepare, "runner command is empty"))?;
        self.program = Some((program, command.collect()));
        Ok(())
    }

    async fn run_tests(&mut self, ctx: &RunnerContext) -> Result<()> {
        let (program, args) = self
            .program
            .clone()
            .ok_or_else(|| BridgeError::phase(Phase::RunTests, "runner was not prepared"))?;
        // Suites may have grown since bootstrap.
        let config = self.write_generated(ctx)?;

        let mut command = Command::new(&program);
        command.args(&args);
        if ctx.config.verbose {
            command.arg("--verbose");
        }
        command
            .arg("--config-file")
            .arg(&config)
            .args(ctx.suites.as_slice())
            .current_dir(&ctx.config.root)
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            command: program.clone(),
            source,
        })?;
        let pid = child.id().map(|id| id as i32);
        if let Some(pid) = pid {
            self.processes.track(pid);
        }

        tracing::info!("running {} suites with {}", ctx.suites.len(), program);
        let status = child.wait().await;
        if let Some(pid) = pid {
            self.processes.untrack(pid);
        }

        let status = status.map_err(|e| BridgeError::phase(Phase::RunTests, e.to_string()))?;
        if !status.success() {
            return Err(BridgeError::phase(
                Phase::RunTests,
                format!("{} exited with {}", program, status),
            ));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let killed = self.processes.kill_all();
        if killed > 0 {
            tracing::info!("killed {} runner processes", killed);
        }
        if let Some(path) = self.generated.take() {
            if !self.keep_generated {
                fs::remove_file(&path).map_err(|e| BridgeError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
