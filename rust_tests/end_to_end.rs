//! End-to-end tests: discovery through suite generation to runner phases
//!
//! A temp project is discovered, entries are registered, and a synthetic
//! compilation stands in for the bundler's output.

mod common;

use common::{write_module, RecordingRunner};
use std::fs;
use std::path::Path;
use suitebridge::bundler::{AssetManifest, BuildEntry, Compilation};
use suitebridge::config::{Options, OptionsOverrides};
use suitebridge::controller::LifecycleState;
use suitebridge::entry::{aggregate_path, entry_name, has_entry_prefix};
use suitebridge::error::Phase;
use suitebridge::suite::MARKER_NAMESPACE;
use suitebridge::Orchestrator;
use tempfile::TempDir;

fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "src/a.spec.js", "describe('a', () => {});");
    write_module(root, "src/b.spec.js", "describe('b', () => {});");
    write_module(root, "src/util.js", "export const x = 1;");
    write_module(root, "node_modules/dep/index.js", "module.exports = {};");
    temp_dir
}

fn options(root: &Path, overrides: OptionsOverrides) -> Options {
    Options::resolve(
        root,
        OptionsOverrides {
            include: Some("**/*.js".to_string()),
            ..overrides
        },
    )
}

/// What the bundler would emit for these entries, plus an unrelated app bundle
fn compile(entries: &[BuildEntry]) -> Compilation {
    entries.iter().fold(
        Compilation::new()
            .with_asset("main", "main.js", "startApp();")
            .with_asset("runtime", "runtime.js", "var __runtime = {};"),
        |compilation, entry| {
            compilation.with_asset(
                entry.name.clone(),
                format!("{}.js", entry.name),
                format!("/* compiled */ load('{}');", entry.import.display()),
            )
        },
    )
}

fn html_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".html"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_two_specs_and_a_plain_module() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let output = options.output.clone();

    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();

    // 2 specs + aggregate
    let entries = orchestrator.entries().to_vec();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].name, entry_name(&root.join("src/a.spec.js")));
    assert_eq!(entries[1].name, entry_name(&root.join("src/b.spec.js")));
    assert_eq!(entries[2].import, aggregate_path(&output));
    assert!(entries.iter().all(|e| has_entry_prefix(&e.name)));

    let aggregate = fs::read_to_string(aggregate_path(&output)).unwrap();
    assert!(aggregate.contains("import '../src/util.js';"));
    assert!(!aggregate.contains("node_modules"));
    assert!(!aggregate.contains("spec.js"));

    orchestrator.before_run();
    let mut compilation = compile(&entries);
    let outcome = orchestrator.emit(&mut compilation).await;
    assert!(compilation.errors.is_empty());

    let suites = html_files(&output);
    assert_eq!(suites.len(), 3);
    for name in &suites {
        let html = fs::read_to_string(output.join(name)).unwrap();
        assert!(!html.contains(MARKER_NAMESPACE), "{} has unresolved markers", name);
        assert!(html.contains("/* compiled */"));
        assert!(!html.contains("startApp();"));
    }

    assert!(outcome.bootstrapped);
    assert!(outcome.ran_tests);
    assert_eq!(outcome.suites, 3);
    let runner = orchestrator.controller().runner();
    assert_eq!(runner.count(Phase::Prepare), 1);
    assert_eq!(runner.count(Phase::RunTests), 1);

    assert!(orchestrator.done().await);
    assert_eq!(orchestrator.controller().runner().count(Phase::Close), 1);
}

#[tokio::test]
async fn test_empty_project_warns_and_runs_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "src/util.js", "export const x = 1;");

    let options = options(root, OptionsOverrides::default());
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();
    assert!(orchestrator.entries().is_empty());
    assert!(!aggregate_path(&output).exists());

    // The bundler builds every registered entry next to the app bundle
    orchestrator.before_run();
    let entries = orchestrator.entries().to_vec();
    let mut compilation = compile(&entries);
    let outcome = orchestrator.emit(&mut compilation).await;

    assert!(outcome.plan.is_empty());
    assert_eq!(outcome.suites, 0);
    assert!(html_files(&output).is_empty());
    assert_eq!(orchestrator.controller().state(), LifecycleState::Idle);
    let runner = orchestrator.controller().runner();
    for phase in Phase::BOOTSTRAP {
        assert_eq!(runner.count(phase), 0);
    }
    assert_eq!(runner.count(Phase::RunTests), 0);
}

#[tokio::test]
async fn test_shared_scripts_precede_entry_source() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(
        root,
        OptionsOverrides {
            scripts: Some(vec!["runtime".to_string(), "vendor".to_string()]),
            ..Default::default()
        },
    );
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();

    let entries = orchestrator.entries().to_vec();
    let mut compilation = compile(&entries);
    orchestrator.emit(&mut compilation).await;

    let html = fs::read_to_string(output.join(format!("{}.html", entries[0].name))).unwrap();
    let shared = html.find("var __runtime = {};").unwrap();
    let own = html.find("/* compiled */").unwrap();
    assert!(shared < own);
}

#[tokio::test]
async fn test_rebuild_is_byte_identical_and_not_duplicated() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();
    let entries = orchestrator.entries().to_vec();
    let suite = output.join(format!("{}.html", entries[0].name));

    orchestrator.watch_run();
    orchestrator.emit(&mut compile(&entries)).await;
    let first = fs::read(&suite).unwrap();

    orchestrator.watch_run();
    let outcome = orchestrator.emit(&mut compile(&entries)).await;
    let second = fs::read(&suite).unwrap();

    assert_eq!(first, second);
    assert_eq!(outcome.suites, 3);
    assert_eq!(orchestrator.controller().runner().run_sizes, vec![3, 3]);
    assert!(!orchestrator.done().await);
}

#[tokio::test]
async fn test_partial_rebuild_keeps_known_suites() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();
    let entries = orchestrator.entries().to_vec();

    orchestrator.watch_run();
    orchestrator.emit(&mut compile(&entries[..1])).await;

    // Only the second spec was rebuilt this time
    orchestrator.watch_run();
    let outcome = orchestrator.emit(&mut compile(&entries[1..2])).await;

    assert_eq!(outcome.suites, 2);
    assert_eq!(orchestrator.controller().runner().run_sizes, vec![1, 2]);
}

#[tokio::test]
async fn test_template_override() {
    let temp_dir = project();
    let root = temp_dir.path();
    write_module(
        root,
        "harness.html",
        "<title>@@suitebridge:runner-bootstrap@@</title>@@suitebridge:inline-scripts@@",
    );
    let options = options(
        root,
        OptionsOverrides {
            template: Some("harness.html".into()),
            ..Default::default()
        },
    );
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();
    let entries = orchestrator.entries().to_vec();
    orchestrator.emit(&mut compile(&entries)).await;

    let html = fs::read_to_string(output.join(format!("{}.html", entries[0].name))).unwrap();
    assert!(html.starts_with("<title>../node_modules/web-component-tester/browser.js</title>"));
    assert!(html.contains("<script>\n"));
}

#[test]
fn test_unknown_template_marker_fails_startup() {
    let temp_dir = project();
    let root = temp_dir.path();
    write_module(root, "harness.html", "@@suitebridge:footer@@");
    let options = options(
        root,
        OptionsOverrides {
            template: Some("harness.html".into()),
            ..Default::default()
        },
    );
    assert!(Orchestrator::new(options, RecordingRunner::new()).is_err());
}

#[tokio::test]
async fn test_suite_write_failure_is_collected() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let output = options.output.clone();
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();
    let entries = orchestrator.entries().to_vec();

    // A directory squatting on the suite path makes the rename fail
    fs::create_dir_all(output.join(format!("{}.html", entries[0].name)).join("blocker")).unwrap();

    orchestrator.before_run();
    let mut compilation = compile(&entries);
    let outcome = orchestrator.emit(&mut compilation).await;

    assert_eq!(compilation.errors.len(), 1);
    assert!(!outcome.ran_tests);
    assert_eq!(orchestrator.controller().run_state().run_count, 1);
    assert!(orchestrator.controller().runner().calls.is_empty());
}

#[tokio::test]
async fn test_run_once_from_asset_directory() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();

    let dist = root.join("dist");
    let chunks: Vec<String> = orchestrator
        .entries()
        .iter()
        .map(|entry| {
            write_module(&dist, &format!("{}.js", entry.name), "/* compiled */");
            format!(r#""{0}": ["{0}.js"]"#, entry.name)
        })
        .collect();
    write_module(&dist, "manifest.json", &format!(r#"{{"chunks": {{{}}}}}"#, chunks.join(", ")));

    let (outcome, compilation) = orchestrator.run_once(&AssetManifest::new(&dist)).await.unwrap();
    assert!(compilation.errors.is_empty());
    assert_eq!(outcome.suites, 3);
    assert!(outcome.ran_tests);
    assert_eq!(orchestrator.controller().runner().calls.last(), Some(&Phase::Close));
}

#[tokio::test]
async fn test_run_once_releases_runner_when_manifest_missing() {
    let temp_dir = project();
    let root = temp_dir.path();
    let options = options(root, OptionsOverrides::default());
    let mut orchestrator = Orchestrator::new(options, RecordingRunner::new()).unwrap();

    let result = orchestrator.run_once(&AssetManifest::new(root.join("dist"))).await;
    assert!(result.is_err());
    assert_eq!(orchestrator.controller().state(), LifecycleState::Draining);
    assert_eq!(orchestrator.controller().runner().calls, vec![Phase::Close]);
}
