//! Configuration Loader
//! - Provides CLI argument parsing with clap
//! - Reads suitebridge.toml for orchestrator options
//! - Resolves the runner's JSON config file and merges it over defaults

use crate::error::{BridgeError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const OPTIONS_FILE: &str = "suitebridge.toml";
pub const DEFAULT_INCLUDE: &str = "**/*.js";
pub const DEFAULT_EXCLUDE: &str = "**/node_modules/**";
pub const DEFAULT_OUTPUT: &str = "__build_tests";
pub const RUNNER_CONFIG_CANDIDATES: [&str; 2] = [".wctrc.json", "wct.conf.json"];
const DEFAULT_RUNNER_SCRIPT: &str = "node_modules/web-component-tester/browser.js";
const DEFAULT_MOCK_SCRIPT: &str = "node_modules/fetch-mock/dist/es5/client-bundle.js";

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for cycle reports
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Human-readable CLI output (to stderr)
    #[default]
    Human,
    /// Machine-readable NDJSON (to stdout)
    Json,
}

/// SuiteBridge CLI - browser test suite orchestrator
#[derive(Parser)]
#[command(name = "suitebridge", version, about = "Browser test suite orchestrator")]
pub struct Cli {
    /// Output format (also: SUITEBRIDGE_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "SUITEBRIDGE_FORMAT")]
    pub format: OutputFormat,

    /// Working root (defaults to the current directory)
    #[arg(long, env = "SUITEBRIDGE_ROOT")]
    pub root: Option<PathBuf>,

    /// Glob a file must match to be discovered
    #[arg(long)]
    pub include: Option<String>,

    /// Glob that excludes files from discovery (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Output directory for generated suites
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Runner config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Shared chunk injected into every suite (repeatable, ordered)
    #[arg(long = "script")]
    pub scripts: Vec<String>,

    /// Keep previously generated files in the output directory
    #[arg(long)]
    pub no_clean: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List discovered modules and their entry names
    List,
    /// Write the entry manifest for the bundler
    Prepare,
    /// Build suites from emitted assets and drive the runner
    Run {
        /// Directory holding the bundler's manifest.json and emitted assets
        #[arg(long)]
        assets: PathBuf,

        /// Re-run a cycle whenever the bundler re-emits
        #[arg(long, short = 'w')]
        watch: bool,
    },
}

impl Cli {
    /// CLI flags as option overrides. Empty lists and absent flags defer to the file.
    pub fn overrides(&self) -> OptionsOverrides {
        OptionsOverrides {
            include: self.include.clone(),
            exclude: (!self.exclude.is_empty()).then(|| self.exclude.clone()),
            output: self.output.clone(),
            config: self.config.clone(),
            clean: self.no_clean.then_some(false),
            scripts: (!self.scripts.is_empty()).then(|| self.scripts.clone()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Orchestrator Options
// =============================================================================

/// User-supplied option values. `None` inherits the next layer down.
#[derive(Deserialize, Default, Debug, Clone, PartialEq)]
pub struct OptionsOverrides {
    pub include: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub clean: Option<bool>,
    pub scripts: Option<Vec<String>>,
    pub template: Option<PathBuf>,
    pub runner_script: Option<PathBuf>,
    pub mock_script: Option<PathBuf>,
}

impl OptionsOverrides {
    /// Field-wise merge where `self` wins over `fallback`.
    pub fn or(self, fallback: OptionsOverrides) -> OptionsOverrides {
        OptionsOverrides {
            include: self.include.or(fallback.include),
            exclude: self.exclude.or(fallback.exclude),
            output: self.output.or(fallback.output),
            config: self.config.or(fallback.config),
            clean: self.clean.or(fallback.clean),
            scripts: self.scripts.or(fallback.scripts),
            template: self.template.or(fallback.template),
            runner_script: self.runner_script.or(fallback.runner_script),
            mock_script: self.mock_script.or(fallback.mock_script),
        }
    }
}

/// Load `suitebridge.toml` from the working root. A missing file yields no overrides.
pub fn load_options_file(root: &Path) -> Result<OptionsOverrides> {
    let path = root.join(OPTIONS_FILE);
    if !path.exists() {
        return Ok(OptionsOverrides::default());
    }

    let contents = fs::read_to_string(&path).map_err(|e| BridgeError::io(&path, e))?;
    toml::from_str(&contents).map_err(|e| BridgeError::Options {
        path,
        message: e.to_string(),
    })
}

/// Resolved orchestrator options. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub root: PathBuf,
    pub include: String,
    pub exclude: Vec<String>,
    /// Absolute output directory
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub clean: bool,
    pub scripts: Vec<String>,
    pub template: Option<PathBuf>,
    pub runner_script: PathBuf,
    pub mock_script: PathBuf,
}

impl Options {
    /// Apply defaults to every field the overrides leave unset.
    ///
    /// Relative paths resolve against `root`. The output directory is always
    /// appended to the exclusions so generated files are never rediscovered.
    pub fn resolve(root: &Path, overrides: OptionsOverrides) -> Self {
        let output = root.join(
            overrides
                .output
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        );

        let mut exclude = overrides
            .exclude
            .unwrap_or_else(|| vec![DEFAULT_EXCLUDE.to_string()]);
        if let Some(relative) = pathdiff::diff_paths(&output, root) {
            if !relative.starts_with("..") && !relative.as_os_str().is_empty() {
                exclude.push(format!("**/{}/**", relative.to_string_lossy()));
            }
        }

        Self {
            root: root.to_path_buf(),
            include: overrides
                .include
                .unwrap_or_else(|| DEFAULT_INCLUDE.to_string()),
            exclude,
            output,
            config: overrides.config.map(|p| root.join(p)),
            clean: overrides.clean.unwrap_or(true),
            scripts: overrides.scripts.unwrap_or_default(),
            template: overrides.template.map(|p| root.join(p)),
            runner_script: root.join(
                overrides
                    .runner_script
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNNER_SCRIPT)),
            ),
            mock_script: root.join(
                overrides
                    .mock_script
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MOCK_SCRIPT)),
            ),
        }
    }

    /// Runner config files to probe, in priority order.
    pub fn config_candidates(&self) -> Vec<PathBuf> {
        match &self.config {
            Some(path) => vec![path.clone()],
            None => RUNNER_CONFIG_CANDIDATES
                .iter()
                .map(|name| self.root.join(name))
                .collect(),
        }
    }
}

// =============================================================================
// Runner Configuration
// =============================================================================

/// Configuration handed to the external runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    pub verbose: bool,
    /// Remote execution provider settings
    pub sauce: Option<Value>,
    pub plugins: PluginsConfig,
    pub root: PathBuf,
    pub npm: bool,
    pub skip_cleanup: bool,
    pub persistent: bool,
    pub expanded: bool,
    /// Program and leading arguments used to launch the runner
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    pub local: Option<Value>,
    pub sauce: Option<Value>,
    pub istanbul: Option<IstanbulConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PluginsConfig {
    /// Names of plugins that are configured (non-null), in name order.
    pub fn enabled(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.local.as_ref().is_some_and(|v| !v.is_null()) {
            names.push("local".to_string());
        }
        if self.sauce.as_ref().is_some_and(|v| !v.is_null()) {
            names.push("sauce".to_string());
        }
        if self.istanbul.is_some() {
            names.push("istanbul".to_string());
        }
        names.extend(
            self.extra
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k.clone()),
        );
        names.sort();
        names
    }
}

/// Coverage plugin settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IstanbulConfig {
    pub dir: PathBuf,
    pub reporters: Vec<String>,
    pub include: String,
    pub exclude: Vec<String>,
}

impl RunnerConfig {
    pub fn defaults(options: &Options) -> Self {
        Self {
            verbose: false,
            sauce: None,
            plugins: PluginsConfig {
                local: None,
                sauce: None,
                istanbul: Some(IstanbulConfig {
                    dir: options.root.join("coverage"),
                    reporters: vec!["text-summary".to_string(), "lcov".to_string()],
                    include: options.include.clone(),
                    exclude: options.exclude.clone(),
                }),
                extra: BTreeMap::new(),
            },
            root: options.root.clone(),
            npm: true,
            skip_cleanup: false,
            persistent: false,
            expanded: false,
            command: vec!["npx".to_string(), "wct".to_string()],
        }
    }
}

/// Outcome of probing for a runner config file
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLookup {
    Found { path: PathBuf, config: RunnerConfig },
    NotFound(RunnerConfig),
}

impl ConfigLookup {
    pub fn config(&self) -> &RunnerConfig {
        match self {
            ConfigLookup::Found { config, .. } => config,
            ConfigLookup::NotFound(config) => config,
        }
    }

    pub fn into_config(self) -> RunnerConfig {
        match self {
            ConfigLookup::Found { config, .. } => config,
            ConfigLookup::NotFound(config) => config,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigLookup::Found { path, .. } => Some(path),
            ConfigLookup::NotFound(_) => None,
        }
    }
}

/// Return the first candidate that parses, merged over `defaults`.
///
/// Missing, unreadable and malformed files are skipped; when nothing parses
/// the defaults come back unchanged as `NotFound`.
pub fn resolve_runner_config(
    root: &Path,
    candidates: &[PathBuf],
    defaults: RunnerConfig,
) -> ConfigLookup {
    for candidate in candidates {
        let path = root.join(candidate);
        if !path.is_file() {
            continue;
        }

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("skipping runner config {}: {}", path.display(), e);
                continue;
            }
        };

        let user: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ignoring malformed runner config {}: {}", path.display(), e);
                continue;
            }
        };

        match merge_over_defaults(&defaults, user) {
            Ok(config) => {
                tracing::debug!("loaded runner config from {}", path.display());
                return ConfigLookup::Found { path, config };
            }
            Err(e) => {
                tracing::warn!("ignoring invalid runner config {}: {}", path.display(), e);
            }
        }
    }

    ConfigLookup::NotFound(defaults)
}

fn merge_over_defaults(defaults: &RunnerConfig, user: Value) -> serde_json::Result<RunnerConfig> {
    let mut merged = serde_json::to_value(defaults)?;
    merge_values(&mut merged, user);
    serde_json::from_value(merged)
}

/// Deep merge: objects merge key by key, any other overlay value replaces the base.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn defaults_for(root: &Path) -> (Options, RunnerConfig) {
        let options = Options::resolve(root, OptionsOverrides::default());
        let config = RunnerConfig::defaults(&options);
        (options, config)
    }

    #[test]
    fn test_options_defaults() {
        let options = Options::resolve(Path::new("/project"), OptionsOverrides::default());
        assert_eq!(options.include, "**/*.js");
        assert_eq!(options.output, PathBuf::from("/project/__build_tests"));
        assert!(options.clean);
        assert!(options.scripts.is_empty());
        assert_eq!(
            options.exclude,
            vec![
                "**/node_modules/**".to_string(),
                "**/__build_tests/**".to_string()
            ]
        );
    }

    #[test]
    fn test_options_user_value_wins() {
        let overrides = OptionsOverrides {
            include: Some("src/**/*.js".to_string()),
            exclude: Some(vec!["**/vendor/**".to_string()]),
            output: Some(PathBuf::from("out/tests")),
            clean: Some(false),
            scripts: Some(vec!["runtime".to_string()]),
            ..Default::default()
        };
        let options = Options::resolve(Path::new("/project"), overrides);
        assert_eq!(options.include, "src/**/*.js");
        assert_eq!(options.output, PathBuf::from("/project/out/tests"));
        assert!(!options.clean);
        assert_eq!(options.scripts, vec!["runtime".to_string()]);
        assert_eq!(
            options.exclude,
            vec!["**/vendor/**".to_string(), "**/out/tests/**".to_string()]
        );
    }

    #[test]
    fn test_output_outside_root_not_excluded() {
        let overrides = OptionsOverrides {
            output: Some(PathBuf::from("/elsewhere/out")),
            ..Default::default()
        };
        let options = Options::resolve(Path::new("/project"), overrides);
        assert_eq!(options.output, PathBuf::from("/elsewhere/out"));
        assert_eq!(options.exclude, vec!["**/node_modules/**".to_string()]);
    }

    #[test]
    fn test_overrides_or_prefers_self() {
        let cli = OptionsOverrides {
            include: Some("a/**".to_string()),
            ..Default::default()
        };
        let file = OptionsOverrides {
            include: Some("b/**".to_string()),
            clean: Some(false),
            ..Default::default()
        };
        let merged = cli.or(file);
        assert_eq!(merged.include.as_deref(), Some("a/**"));
        assert_eq!(merged.clean, Some(false));
    }

    #[test]
    fn test_config_candidates_default_order() {
        let options = Options::resolve(Path::new("/project"), OptionsOverrides::default());
        assert_eq!(
            options.config_candidates(),
            vec![
                PathBuf::from("/project/.wctrc.json"),
                PathBuf::from("/project/wct.conf.json")
            ]
        );
    }

    #[test]
    fn test_load_options_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let overrides = load_options_file(temp_dir.path()).unwrap();
        assert_eq!(overrides, OptionsOverrides::default());
    }

    #[test]
    fn test_load_options_file_parses() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(OPTIONS_FILE),
            r#"
include = "src/**/*.js"
scripts = ["runtime", "polyfills"]
clean = false
"#,
        )
        .unwrap();

        let overrides = load_options_file(temp_dir.path()).unwrap();
        assert_eq!(overrides.include.as_deref(), Some("src/**/*.js"));
        assert_eq!(
            overrides.scripts,
            Some(vec!["runtime".to_string(), "polyfills".to_string()])
        );
        assert_eq!(overrides.clean, Some(false));
    }

    #[test]
    fn test_load_options_file_malformed() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(OPTIONS_FILE), "include = [").unwrap();
        assert!(matches!(
            load_options_file(temp_dir.path()),
            Err(BridgeError::Options { .. })
        ));
    }

    #[test]
    fn test_runner_config_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let (options, defaults) = defaults_for(temp_dir.path());

        let lookup =
            resolve_runner_config(temp_dir.path(), &options.config_candidates(), defaults.clone());
        assert_eq!(lookup, ConfigLookup::NotFound(defaults));
        assert!(lookup.path().is_none());
    }

    #[test]
    fn test_runner_config_leaf_merge() {
        let temp_dir = TempDir::new().unwrap();
        let (options, defaults) = defaults_for(temp_dir.path());
        std::fs::write(
            temp_dir.path().join(".wctrc.json"),
            r#"{"verbose": true, "plugins": {"istanbul": {"reporters": ["html"]}}}"#,
        )
        .unwrap();

        let lookup = resolve_runner_config(temp_dir.path(), &options.config_candidates(), defaults);
        assert_eq!(lookup.path(), Some(temp_dir.path().join(".wctrc.json").as_path()));

        let config = lookup.into_config();
        assert!(config.verbose);
        assert!(config.npm);
        let istanbul = config.plugins.istanbul.unwrap();
        assert_eq!(istanbul.reporters, vec!["html".to_string()]);
        assert_eq!(istanbul.dir, temp_dir.path().join("coverage"));
        assert_eq!(istanbul.include, "**/*.js");
    }

    #[test]
    fn test_runner_config_malformed_falls_through() {
        let temp_dir = TempDir::new().unwrap();
        let (options, defaults) = defaults_for(temp_dir.path());
        std::fs::write(temp_dir.path().join(".wctrc.json"), "{ not json").unwrap();
        std::fs::write(temp_dir.path().join("wct.conf.json"), r#"{"persistent": true}"#).unwrap();

        let lookup = resolve_runner_config(temp_dir.path(), &options.config_candidates(), defaults);
        assert_eq!(lookup.path(), Some(temp_dir.path().join("wct.conf.json").as_path()));
        assert!(lookup.config().persistent);
    }

    #[test]
    fn test_runner_config_wrong_types_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let (options, defaults) = defaults_for(temp_dir.path());
        std::fs::write(temp_dir.path().join(".wctrc.json"), r#"{"verbose": "loud"}"#).unwrap();

        let lookup =
            resolve_runner_config(temp_dir.path(), &options.config_candidates(), defaults.clone());
        assert_eq!(lookup, ConfigLookup::NotFound(defaults));
    }

    #[test]
    fn test_runner_config_extra_plugins_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let (options, defaults) = defaults_for(temp_dir.path());
        std::fs::write(
            temp_dir.path().join(".wctrc.json"),
            r#"{"plugins": {"local": {"browsers": ["chrome"]}, "istanbul": null, "a11y": {}}}"#,
        )
        .unwrap();

        let config =
            resolve_runner_config(temp_dir.path(), &options.config_candidates(), defaults)
                .into_config();
        assert!(config.plugins.istanbul.is_none());
        assert!(config.plugins.extra.contains_key("a11y"));
        assert_eq!(
            config.plugins.enabled(),
            vec!["a11y".to_string(), "local".to_string()]
        );
    }

    #[test]
    fn test_merge_values_replaces_arrays() {
        let mut base = json!({"a": [1, 2], "b": {"c": 1, "d": 2}});
        merge_values(&mut base, json!({"a": [3], "b": {"d": 5}}));
        assert_eq!(base, json!({"a": [3], "b": {"c": 1, "d": 5}}));
    }
}
