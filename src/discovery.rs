//! File Discovery
//!
//! Walks the working root and partitions matching files into specification
//! modules (`*.spec.*`) and plain modules. Exclusions always beat inclusions.
//! Output order is stable for a fixed filesystem snapshot.

use crate::config::Options;
use crate::error::{BridgeError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiscoveryResult {
    /// Absolute paths of specification modules, sorted
    pub specs: Vec<PathBuf>,
    /// Absolute paths of every other matched module, sorted
    pub plain: Vec<PathBuf>,
}

impl DiscoveryResult {
    pub fn spec_count(&self) -> usize {
        self.specs.len()
    }

    pub fn plain_count(&self) -> usize {
        self.plain.len()
    }
}

/// Discover modules using the include/exclude patterns from `options`.
pub fn discover_with(options: &Options) -> Result<DiscoveryResult> {
    discover(&options.root, &options.include, &options.exclude)
}

pub fn discover(root: &Path, include: &str, exclude: &[String]) -> Result<DiscoveryResult> {
    let include_set = build_set(std::slice::from_ref(&include.to_string()))?;
    let exclude_set = build_set(exclude)?;
    let pruned_dirs = build_set(&directory_patterns(exclude))?;

    let mut results = DiscoveryResult::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        match entry.path().strip_prefix(root) {
            Ok(rel) => !pruned_dirs.is_match(rel),
            Err(_) => true,
        }
    });

    for entry in walker {
        let entry = entry.map_err(|source| BridgeError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if !include_set.is_match(rel) || exclude_set.is_match(rel) {
            continue;
        }

        if is_spec_module(path) {
            results.specs.push(path.to_path_buf());
        } else {
            results.plain.push(path.to_path_buf());
        }
    }

    results.specs.sort();
    results.plain.sort();

    tracing::debug!(
        "discovered {} spec modules, {} plain modules under {}",
        results.spec_count(),
        results.plain_count(),
        root.display()
    );

    Ok(results)
}

/// A specification module has `.spec.` in its file name (`a.spec.js`, `b.spec.ts`).
pub fn is_spec_module(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().contains(".spec."))
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| BridgeError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| BridgeError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Exclusions of the form `dir/**` let the walker skip `dir` entirely.
fn directory_patterns(exclude: &[String]) -> Vec<String> {
    exclude
        .iter()
        .filter_map(|p| p.strip_suffix("/**"))
        .filter(|p| !p.is_empty() && *p != "**")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_is_spec_module() {
        assert!(is_spec_module(Path::new("src/a.spec.js")));
        assert!(is_spec_module(Path::new("b.spec.ts")));
        assert!(!is_spec_module(Path::new("src/spec.js")));
        assert!(!is_spec_module(Path::new("src/util.js")));
        assert!(!is_spec_module(Path::new("specs/util.js")));
    }

    #[test]
    fn test_directory_patterns() {
        let patterns = directory_patterns(&[
            "**/node_modules/**".to_string(),
            "**/*.min.js".to_string(),
            "**".to_string(),
        ]);
        assert_eq!(patterns, vec!["**/node_modules".to_string()]);
    }

    #[test]
    fn test_partition_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "src/z.spec.js");
        touch(root, "src/a.spec.js");
        touch(root, "src/util.js");
        touch(root, "lib/index.js");
        touch(root, "README.md");

        let result = discover(root, "**/*.js", &[]).unwrap();
        assert_eq!(
            result.specs,
            vec![root.join("src/a.spec.js"), root.join("src/z.spec.js")]
        );
        assert_eq!(
            result.plain,
            vec![root.join("lib/index.js"), root.join("src/util.js")]
        );
    }

    #[test]
    fn test_exclude_beats_include() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "node_modules/pkg/index.js");
        touch(root, "node_modules/pkg/x.spec.js");
        touch(root, "src/keep.spec.js");
        touch(root, "src/skip.spec.js");

        let exclude = vec![
            "**/node_modules/**".to_string(),
            "**/skip.spec.js".to_string(),
        ];
        let result = discover(root, "**/*.js", &exclude).unwrap();
        assert_eq!(result.specs, vec![root.join("src/keep.spec.js")]);
        assert!(result.plain.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let err = discover(temp_dir.path(), "src/[", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Pattern { .. }));
    }

    #[test]
    fn test_stable_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["c.spec.js", "a.spec.js", "b/d.spec.js", "b.js"] {
            touch(root, name);
        }

        let first = discover(root, "**/*.js", &[]).unwrap();
        let second = discover(root, "**/*.js", &[]).unwrap();
        assert_eq!(first, second);
    }
}
