//! Integration tests for discovery and entry registration
//!
//! These tests build small project trees in temp directories and check the
//! partitioning, exclusion and naming guarantees rebuilds depend on.

mod common;

use common::{write_module, RecordingRunner};
use std::path::Path;
use suitebridge::config::{Options, OptionsOverrides};
use suitebridge::discovery::{discover, discover_with};
use suitebridge::entry::{entry_name, EntryInjector};
use suitebridge::Orchestrator;
use tempfile::TempDir;

#[test]
fn test_discover_empty_temp_directory() {
    let temp_dir = TempDir::new().unwrap();
    let result = discover(temp_dir.path(), "**/*.js", &[]).expect("Discovery should succeed");

    assert_eq!(result.spec_count(), 0, "Empty dir should have no specs");
    assert_eq!(result.plain_count(), 0, "Empty dir should have no modules");
}

#[test]
fn test_discover_ignores_unmatched_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "styles.css", "");
    write_module(root, "index.html", "");
    write_module(root, "a.spec.ts", "");

    let result = discover(root, "**/*.js", &[]).unwrap();
    assert_eq!(result.spec_count(), 0);
    assert_eq!(result.plain_count(), 0);
}

#[test]
fn test_output_directory_never_discovered() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "src/a.spec.js", "");
    write_module(root, "__build_tests/stale.spec.js", "");
    write_module(root, "node_modules/lib/lib.spec.js", "");

    let options = Options::resolve(root, OptionsOverrides::default());
    let result = discover_with(&options).unwrap();
    assert_eq!(result.specs, vec![root.join("src/a.spec.js")]);
}

#[test]
fn test_custom_include_restricts_scope() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "src/a.spec.js", "");
    write_module(root, "scripts/build.js", "");

    let options = Options::resolve(
        root,
        OptionsOverrides {
            include: Some("src/**/*.js".to_string()),
            ..Default::default()
        },
    );
    let result = discover_with(&options).unwrap();
    assert_eq!(result.spec_count(), 1);
    assert_eq!(result.plain_count(), 0);
}

#[test]
fn test_entry_names_stable_across_injections() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "a.spec.js", "");
    write_module(root, "b.spec.js", "");
    write_module(root, "util.js", "");

    let discovered = discover(root, "**/*.js", &[]).unwrap();
    let injector = EntryInjector::new(root.join("out"));
    let first = injector.inject(&discovered).unwrap();
    let second = injector.inject(&discovered).unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].name, entry_name(&root.join("a.spec.js")));
}

#[test]
fn test_entry_name_depends_on_absolute_path() {
    let a = entry_name(Path::new("/one/src/a.spec.js"));
    let b = entry_name(Path::new("/two/src/a.spec.js"));
    assert_ne!(a, b);
}

#[test]
fn test_clean_option_controls_stale_output() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_module(root, "a.spec.js", "");
    let stale = write_module(root, "__build_tests/SuiteBridge-old.html", "");

    let keep = Options::resolve(
        root,
        OptionsOverrides {
            clean: Some(false),
            ..Default::default()
        },
    );
    Orchestrator::new(keep, RecordingRunner::new()).unwrap();
    assert!(stale.exists());

    let clean = Options::resolve(root, OptionsOverrides::default());
    Orchestrator::new(clean, RecordingRunner::new()).unwrap();
    assert!(!stale.exists());
}
