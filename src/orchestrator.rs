//! Orchestrator
//!
//! Ties the pieces together behind the bundler's hook surface: construction
//! resolves config, discovers modules and registers entries; every emitted
//! cycle maps chunks, regenerates suites and hands over to the controller.

use crate::bundler::{AssetManifest, BuildEntry, Compilation};
use crate::chunks::{shared_scripts, ChunkMap};
use crate::config::{resolve_runner_config, Options, RunnerConfig};
use crate::controller::{CycleOutcome, ExecutionLifecycleController};
use crate::discovery::discover_with;
use crate::entry::EntryInjector;
use crate::error::{BridgeError, Result};
use crate::runner::Runner;
use crate::suite::{SuiteGenerator, SuiteTemplate};
use std::fs;
use std::path::Path;

pub struct Orchestrator<R: Runner> {
    options: Options,
    entries: Vec<BuildEntry>,
    generator: SuiteGenerator,
    controller: ExecutionLifecycleController<R>,
}

impl<R: Runner> Orchestrator<R> {
    /// Prepare the output directory and register entries.
    ///
    /// Fails if the output directory, the aggregate spec or the template cannot
    /// be prepared; a missing runner config falls back to defaults.
    pub fn new(options: Options, runner: R) -> Result<Self> {
        prepare_output_dir(&options.root, &options.output, options.clean)?;

        let lookup = resolve_runner_config(
            &options.root,
            &options.config_candidates(),
            RunnerConfig::defaults(&options),
        );
        match lookup.path() {
            Some(path) => tracing::info!("using runner config {}", path.display()),
            None => tracing::debug!("no runner config found, using defaults"),
        }

        let discovered = discover_with(&options)?;
        let entries = EntryInjector::new(&options.output).inject(&discovered)?;

        let template = match &options.template {
            Some(path) => SuiteTemplate::load(path)?,
            None => SuiteTemplate::builtin(),
        };
        let generator = SuiteGenerator::new(
            &options.root,
            &options.output,
            template,
            &options.runner_script,
            &options.mock_script,
        );

        Ok(Self {
            options,
            entries,
            generator,
            controller: ExecutionLifecycleController::new(runner, lookup.into_config()),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Entries to register with the bundler, aggregate last
    pub fn entries(&self) -> &[BuildEntry] {
        &self.entries
    }

    pub fn controller(&self) -> &ExecutionLifecycleController<R> {
        &self.controller
    }

    /// Hook: a one-shot build is starting.
    pub fn before_run(&mut self) {
        self.controller.before_run();
    }

    /// Hook: a watch-triggered cycle is starting.
    pub fn watch_run(&mut self) {
        self.controller.watch_run();
    }

    /// Hook: a cycle has emitted its assets.
    ///
    /// Failures are appended to `compilation.errors`; this never fails itself.
    pub async fn emit(&mut self, compilation: &mut Compilation) -> CycleOutcome {
        if self.controller.is_inert() {
            return self.controller.complete_cycle(&mut compilation.errors).await;
        }

        let chunks = ChunkMap::from_compilation(compilation);
        let shared = shared_scripts(compilation, &self.options.scripts);

        let mut failures: Vec<BridgeError> = Vec::new();
        for (entry, file) in chunks.iter() {
            let source = compilation.source(file).unwrap_or_default();
            match self.generator.generate(entry, source, &shared) {
                Ok(suite) => {
                    if self.controller.add_suite(suite.clone()) {
                        tracing::debug!("new suite {}", suite.display());
                    }
                }
                Err(e) => failures.push(e),
            }
        }

        if !failures.is_empty() {
            tracing::warn!("{} suites could not be generated", failures.len());
            compilation.errors.extend(failures);
            return self.controller.abandon_cycle();
        }

        self.controller.complete_cycle(&mut compilation.errors).await
    }

    /// Hook: the one-shot pipeline is done. Returns `true` if the runner was released.
    pub async fn done(&mut self) -> bool {
        self.controller.finish().await
    }

    /// Drive a whole one-shot build from an emitted asset directory.
    ///
    /// The runner is released even when the manifest cannot be loaded.
    pub async fn run_once(
        &mut self,
        manifest: &AssetManifest,
    ) -> Result<(CycleOutcome, Compilation)> {
        self.before_run();
        let cycle = match manifest.load() {
            Ok(mut compilation) => {
                let outcome = self.emit(&mut compilation).await;
                Ok((outcome, compilation))
            }
            Err(e) => Err(e),
        };
        self.done().await;
        cycle
    }

    /// Release the runner before the process exits.
    pub async fn shutdown(&mut self) -> bool {
        self.controller.shutdown().await
    }
}

/// Create the output directory, emptying it first when `clean` is set.
///
/// An output directory that contains the working root is never emptied.
pub fn prepare_output_dir(root: &Path, output: &Path, clean: bool) -> Result<()> {
    if clean && output.is_dir() {
        if root.starts_with(output) {
            tracing::warn!(
                "not cleaning {}: it contains the working root",
                output.display()
            );
        } else {
            fs::remove_dir_all(output).map_err(|e| BridgeError::io(output, e))?;
            tracing::debug!("cleaned {}", output.display());
        }
    }
    fs::create_dir_all(output).map_err(|e| BridgeError::io(output, e))
}
