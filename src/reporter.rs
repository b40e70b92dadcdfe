//! Reporting of discovered modules and finished build cycles
//!
//! `--format=json` selects `JsonReporter`, one JSON object per line on stdout.
//! The default `HumanReporter` writes to stderr next to the tracing logs.
//! With JSON selected nothing but event lines may reach stdout.

use crate::controller::CycleOutcome;
use serde::Serialize;
use std::path::Path;

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    /// A discovered module; specs carry their entry name
    Module {
        path: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        entry: Option<&'a str>,
    },
    /// A build cycle was processed
    CycleFinished {
        cycle: u64,
        suites: usize,
        bootstrapped: bool,
        ran_tests: bool,
        errors: &'a [String],
    },
    /// Emitted on fatal error
    Error { message: &'a str },
}

pub trait Reporter {
    /// Called per discovered module (`list`) or registered entry (`prepare`)
    fn on_module(&mut self, path: &Path, entry: Option<&str>);

    /// Called after every build cycle
    fn on_cycle_finished(&mut self, outcome: &CycleOutcome, errors: &[String]);

    /// Called on fatal error
    fn on_error(&mut self, message: &str);
}

/// JSON Reporter - outputs NDJSON to stdout
pub struct JsonReporter;

impl JsonReporter {
    fn emit(event: &MachineEvent<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("failed to serialize event: {}", e),
        }
    }
}

impl Reporter for JsonReporter {
    fn on_module(&mut self, path: &Path, entry: Option<&str>) {
        let path = path.to_string_lossy();
        Self::emit(&MachineEvent::Module { path: &path, entry });
    }

    fn on_cycle_finished(&mut self, outcome: &CycleOutcome, errors: &[String]) {
        Self::emit(&MachineEvent::CycleFinished {
            cycle: outcome.cycle,
            suites: outcome.suites,
            bootstrapped: outcome.bootstrapped,
            ran_tests: outcome.ran_tests,
            errors,
        });
    }

    fn on_error(&mut self, message: &str) {
        Self::emit(&MachineEvent::Error { message });
    }
}

/// Human Reporter - outputs readable text to stderr
pub struct HumanReporter;

impl Reporter for HumanReporter {
    fn on_module(&mut self, path: &Path, entry: Option<&str>) {
        match entry {
            Some(entry) => eprintln!("  {}  {}", entry, path.display()),
            None => eprintln!("  {:<28}  {}", "(plain)", path.display()),
        }
    }

    fn on_cycle_finished(&mut self, outcome: &CycleOutcome, errors: &[String]) {
        let action = match (outcome.bootstrapped, outcome.ran_tests) {
            (true, true) => "bootstrapped runner, ran tests",
            (false, true) => "ran tests",
            (true, false) => "bootstrapped runner",
            (false, false) => "no runner phases",
        };
        eprintln!(
            "[suitebridge] cycle {}: {} suites, {}",
            outcome.cycle, outcome.suites, action
        );
        for error in errors {
            eprintln!("    ✗ {}", error);
        }
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[suitebridge] FATAL ERROR: {}", message);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_event_serialization() {
        let event = MachineEvent::Module {
            path: "src/a.spec.js",
            entry: Some("SuiteBridge-0011223344556677"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"module\""));
        assert!(json.contains("\"entry\":\"SuiteBridge-0011223344556677\""));
    }

    #[test]
    fn test_plain_module_omits_entry() {
        let event = MachineEvent::Module {
            path: "src/util.js",
            entry: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("entry"));
    }

    #[test]
    fn test_cycle_event() {
        let errors = vec!["runner phase 'run-tests' failed: exit status 1".to_string()];
        let event = MachineEvent::CycleFinished {
            cycle: 2,
            suites: 3,
            bootstrapped: false,
            ran_tests: true,
            errors: &errors,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"cycle_finished\""));
        assert!(json.contains("\"cycle\":2"));
        assert!(json.contains("run-tests"));
    }

    #[test]
    fn test_error_event() {
        let event = MachineEvent::Error {
            message: "output directory is not writable",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
    }
}
