//! Chunk/Asset Mapping
//!
//! Resolves the bundler's chunk names back to the logical entry names we
//! registered. Only entries carrying our prefix make it into the map; other
//! bundles in the same compilation are ignored.

use crate::bundler::Compilation;
use crate::entry::has_entry_prefix;
use std::collections::BTreeMap;

/// Logical entry name -> emitted script file, rebuilt every cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChunkMap {
    entries: BTreeMap<String, String>,
}

impl ChunkMap {
    /// Map every prefixed chunk that emitted a script this cycle.
    ///
    /// Chunks that were not rebuilt (no script, or a script missing from the
    /// assets) are omitted rather than treated as errors.
    pub fn from_compilation(compilation: &Compilation) -> Self {
        let entries = compilation
            .chunks
            .iter()
            .filter(|(name, _)| has_entry_prefix(name))
            .filter_map(|(name, files)| {
                script_file(compilation, files).map(|file| (name.clone(), file.to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, entry: &str) -> Option<&str> {
        self.entries.get(entry).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The first emitted `.js` file of a chunk that is present in the assets.
fn script_file<'a>(compilation: &Compilation, files: &'a [String]) -> Option<&'a str> {
    files
        .iter()
        .map(String::as_str)
        .filter(|f| f.ends_with(".js"))
        .find(|f| compilation.assets.contains_key(*f))
}

/// Concatenate the sources of the named shared chunks, in order.
///
/// Names with no emitted script this cycle are skipped silently.
pub fn shared_scripts(compilation: &Compilation, names: &[String]) -> String {
    let mut scripts = String::new();
    for name in names {
        let source = compilation
            .chunks
            .get(name)
            .and_then(|files| script_file(compilation, files))
            .and_then(|file| compilation.source(file));
        if let Some(source) = source {
            scripts.push_str(source);
            scripts.push('\n');
        }
    }
    scripts
}
