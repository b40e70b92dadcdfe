//! SuiteBridge Library
//!
//! Turns discovered spec modules into browser test suites and drives the
//! test runner across bundler build cycles.
//! The binary entry point is in main.rs.

pub mod bundler;
pub mod chunks;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod reporter;
pub mod runner;
pub mod signals;
pub mod suite;
pub mod watch;

pub use error::{BridgeError, Phase, Result};
pub use orchestrator::Orchestrator;
