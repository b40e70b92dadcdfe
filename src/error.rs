//! Error types shared across the orchestrator
//!
//! Every failure the orchestrator can observe maps to one `BridgeError` variant.
//! Phase failures are collected into the cycle's `Compilation::errors` instead of
//! being propagated, so only startup errors ever reach the caller.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("template contains unknown placeholder '{marker}'")]
    UnknownPlaceholder { marker: String },

    #[error("invalid asset manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("invalid options file {}: {message}", path.display())]
    Options { path: PathBuf, message: String },

    #[error("runner phase '{phase}' failed: {message}")]
    Phase { phase: Phase, message: String },

    #[error("failed to spawn runner command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BridgeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn phase(phase: Phase, message: impl Into<String>) -> Self {
        BridgeError::Phase {
            phase,
            message: message.into(),
        }
    }
}

/// The runner protocol steps, in the order the controller invokes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SetupOverrides,
    LoadPlugins,
    Configure,
    Prepare,
    RunTests,
    Close,
}

impl Phase {
    /// One-time phases run before the first run-tests phase.
    pub const BOOTSTRAP: [Phase; 4] = [
        Phase::SetupOverrides,
        Phase::LoadPlugins,
        Phase::Configure,
        Phase::Prepare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::SetupOverrides => "setup-overrides",
            Phase::LoadPlugins => "load-plugins",
            Phase::Configure => "configure",
            Phase::Prepare => "prepare",
            Phase::RunTests => "run-tests",
            Phase::Close => "close",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
