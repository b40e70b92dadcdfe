use anyhow::{bail, Context, Result};
use clap::Parser;
use suitebridge::bundler::{write_entries, AssetManifest, Compilation, MANIFEST_FILE};
use suitebridge::config::{load_options_file, Cli, Commands, Options, OutputFormat};
use suitebridge::controller::CycleOutcome;
use suitebridge::discovery::discover_with;
use suitebridge::entry::entry_name;
use suitebridge::reporter::{HumanReporter, JsonReporter, Reporter};
use suitebridge::runner::CommandRunner;
use suitebridge::signals::ShutdownFlag;
use suitebridge::{watch, Orchestrator};

fn main() -> Result<()> {
    // Logs go to stderr so --format=json keeps stdout clean
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    let mut reporter: Box<dyn Reporter> = match cli.format {
        OutputFormat::Human => Box::new(HumanReporter),
        OutputFormat::Json => Box::new(JsonReporter),
    };

    if let Err(e) = run(&cli, reporter.as_mut()) {
        reporter.on_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli, reporter: &mut dyn Reporter) -> Result<()> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot read current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("working root {} does not exist", root.display()))?;

    let overrides = cli.overrides().or(load_options_file(&root)?);
    let options = Options::resolve(&root, overrides);

    match &cli.command {
        Commands::List => {
            let discovered = discover_with(&options)?;
            for spec in &discovered.specs {
                reporter.on_module(spec, Some(entry_name(spec).as_str()));
            }
            for module in &discovered.plain {
                reporter.on_module(module, None);
            }
            Ok(())
        }
        Commands::Prepare => {
            let output = options.output.clone();
            let orchestrator = Orchestrator::new(options, CommandRunner::new(&output))?;
            let path = write_entries(&output, orchestrator.entries())?;
            for entry in orchestrator.entries() {
                reporter.on_module(&entry.import, Some(entry.name.as_str()));
            }
            tracing::info!("entries written to {}", path.display());
            Ok(())
        }
        Commands::Run { assets, watch } => {
            let manifest = AssetManifest::new(root.join(assets));
            if *watch {
                run_watch(options, manifest, reporter)
            } else {
                run_once(options, manifest, reporter)
            }
        }
    }
}

fn run_once(options: Options, manifest: AssetManifest, reporter: &mut dyn Reporter) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, CommandRunner::new(&output))?;
    write_entries(&output, orchestrator.entries())?;

    let (outcome, compilation) = runtime.block_on(orchestrator.run_once(&manifest))?;
    let failures = report(reporter, &outcome, &compilation);

    if failures > 0 {
        bail!("{} errors during the build cycle", failures);
    }
    Ok(())
}

fn run_watch(options: Options, manifest: AssetManifest, reporter: &mut dyn Reporter) -> Result<()> {
    let shutdown = ShutdownFlag::install().context("failed to install signal handlers")?;

    let runtime = tokio::runtime::Runtime::new()?;
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, CommandRunner::new(&output))?;
    write_entries(&output, orchestrator.entries())?;

    watch::start_watch_loop(manifest.dir(), MANIFEST_FILE, &shutdown, || {
        runtime.block_on(async {
            orchestrator.watch_run();
            let mut compilation = manifest.load()?;
            let outcome = orchestrator.emit(&mut compilation).await;
            report(&mut *reporter, &outcome, &compilation);
            Ok::<(), anyhow::Error>(())
        })
    })?;

    runtime.block_on(orchestrator.shutdown());
    Ok(())
}

fn report(reporter: &mut dyn Reporter, outcome: &CycleOutcome, compilation: &Compilation) -> usize {
    let errors: Vec<String> = compilation.errors.iter().map(|e| e.to_string()).collect();
    reporter.on_cycle_finished(outcome, &errors);
    errors.len()
}
