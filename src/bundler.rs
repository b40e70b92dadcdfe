//! Bundler Boundary
//!
//! Types exchanged with the external module bundler: the entries we register,
//! the output of one build cycle, and the hook events that drive the pipeline.
//! `AssetManifest` is the on-disk adapter the CLI uses to read a cycle's output.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENTRIES_FILE: &str = "entries.json";

/// A named root module registered with the bundler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub name: String,
    pub import: PathBuf,
}

impl BuildEntry {
    pub fn new(name: impl Into<String>, import: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            import: import.into(),
        }
    }
}

/// Write `entries.json` (entry name -> import path) for the bundler to pick up.
pub fn write_entries(output: &Path, entries: &[BuildEntry]) -> Result<PathBuf> {
    let map: BTreeMap<&str, &Path> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.import.as_path()))
        .collect();
    let path = output.join(ENTRIES_FILE);
    let json = serde_json::to_string_pretty(&map).map_err(|e| BridgeError::Manifest {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| BridgeError::io(&path, e))?;
    Ok(path)
}

/// Output of one build cycle
#[derive(Debug, Default)]
pub struct Compilation {
    /// Chunk name -> files emitted for that chunk
    pub chunks: BTreeMap<String, Vec<String>>,
    /// Emitted file name -> source text
    pub assets: BTreeMap<String, String>,
    /// Errors reported back to the pipeline for this cycle
    pub errors: Vec<BridgeError>,
}

impl Compilation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk that emitted a single file.
    pub fn with_asset(
        mut self,
        chunk: impl Into<String>,
        file: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let file = file.into();
        self.chunks
            .entry(chunk.into())
            .or_default()
            .push(file.clone());
        self.assets.insert(file, source.into());
        self
    }

    pub fn source(&self, file: &str) -> Option<&str> {
        self.assets.get(file).map(String::as_str)
    }
}

/// Hooks the bundler fires, in pipeline order
#[derive(Debug)]
pub enum BuildEvent {
    /// A one-shot build is about to start its first cycle
    BeforeRun,
    /// A watch-triggered cycle has started
    WatchRun,
    /// The one-shot pipeline has finished and no further cycles will follow
    Done,
}

// =============================================================================
// On-disk asset manifest
// =============================================================================

#[derive(Deserialize, Default)]
struct ManifestFile {
    #[serde(default)]
    chunks: BTreeMap<String, Vec<String>>,
}

/// Reads a cycle's output from a directory holding `manifest.json` and the emitted files.
pub struct AssetManifest {
    dir: PathBuf,
}

impl AssetManifest {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Load the current cycle. Files listed but not present are left out.
    pub fn load(&self) -> Result<Compilation> {
        let path = self.manifest_path();
        let contents = fs::read_to_string(&path).map_err(|e| BridgeError::io(&path, e))?;
        let manifest: ManifestFile =
            serde_json::from_str(&contents).map_err(|e| BridgeError::Manifest {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let mut compilation = Compilation::new();
        for (chunk, files) in manifest.chunks {
            for file in &files {
                let asset = self.dir.join(file);
                match fs::read_to_string(&asset) {
                    Ok(source) => {
                        compilation.assets.insert(file.clone(), source);
                    }
                    Err(e) => {
                        tracing::debug!("asset {} not emitted this cycle: {}", asset.display(), e);
                    }
                }
            }
            compilation.chunks.insert(chunk, files);
        }
        Ok(compilation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_asset() {
        let compilation = Compilation::new().with_asset("runtime", "runtime.js", "var r;");
        assert_eq!(compilation.chunks["runtime"], vec!["runtime.js".to_string()]);
        assert_eq!(compilation.source("runtime.js"), Some("var r;"));
        assert!(compilation.errors.is_empty());
    }

    #[test]
    fn test_manifest_load() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(MANIFEST_FILE),
            r#"{"chunks": {"SuiteBridge-1": ["a.js", "a.js.map"], "runtime": ["runtime.js"]}}"#,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("a.js"), "console.log('a');").unwrap();

        let compilation = AssetManifest::new(temp_dir.path()).load().unwrap();
        assert_eq!(compilation.chunks.len(), 2);
        assert_eq!(compilation.source("a.js"), Some("console.log('a');"));
        assert_eq!(compilation.source("runtime.js"), None);
    }

    #[test]
    fn test_manifest_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = AssetManifest::new(temp_dir.path()).load();
        assert!(matches!(result, Err(BridgeError::Io { .. })));
    }

    #[test]
    fn test_manifest_malformed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(MANIFEST_FILE), "[").unwrap();
        let result = AssetManifest::new(temp_dir.path()).load();
        assert!(matches!(result, Err(BridgeError::Manifest { .. })));
    }

    #[test]
    fn test_write_entries() {
        let temp_dir = TempDir::new().unwrap();
        let entries = vec![BuildEntry::new("SuiteBridge-1", "/p/a.spec.js")];
        let path = write_entries(temp_dir.path(), &entries).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["SuiteBridge-1"], "/p/a.spec.js");
    }
}
