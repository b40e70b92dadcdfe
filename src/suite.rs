//! Suite Generation
//!
//! Renders one HTML harness per specification bundle from a fixed template.
//! Placeholders use the `@@suitebridge:<name>@@` namespace, which compiled
//! sources never produce, and every occurrence of each one is replaced.

use crate::error::{BridgeError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const MARKER_NAMESPACE: &str = "@@suitebridge:";
pub const RUNNER_MARKER: &str = "@@suitebridge:runner-bootstrap@@";
pub const MOCK_MARKER: &str = "@@suitebridge:request-mock@@";
pub const SCRIPTS_MARKER: &str = "@@suitebridge:inline-scripts@@";
const KNOWN_MARKERS: [&str; 3] = [RUNNER_MARKER, MOCK_MARKER, SCRIPTS_MARKER];

const BUILTIN_TEMPLATE: &str = include_str!("templates/suite.html");

/// Replace every occurrence of `marker`. Replacement text is never rescanned.
pub fn fill_placeholder(template: &str, marker: &str, value: &str) -> String {
    template.replace(marker, value)
}

/// Keep injected sources from closing the surrounding `<script>` element.
pub fn escape_script_close(source: &str) -> String {
    const NEEDLE: &[u8] = b"</script";
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut i = 0;

    while i + NEEDLE.len() <= bytes.len() {
        if bytes[i..i + NEEDLE.len()].eq_ignore_ascii_case(NEEDLE) {
            out.push_str(&source[last..i]);
            out.push_str("<\\/");
            last = i + 2;
            i += NEEDLE.len();
        } else {
            i += 1;
        }
    }
    out.push_str(&source[last..]);
    out
}

/// HTML template with validated placeholder markers
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteTemplate {
    text: String,
}

impl SuiteTemplate {
    pub fn builtin() -> Self {
        Self {
            text: BUILTIN_TEMPLATE.to_string(),
        }
    }

    /// Reject templates carrying markers we would leave unresolved.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let mut rest = text.as_str();
        while let Some(start) = rest.find(MARKER_NAMESPACE) {
            let candidate = &rest[start..];
            let known = KNOWN_MARKERS.iter().find(|m| candidate.starts_with(**m));
            match known {
                Some(marker) => rest = &candidate[marker.len()..],
                None => {
                    let end = candidate[MARKER_NAMESPACE.len()..]
                        .find("@@")
                        .map(|i| i + MARKER_NAMESPACE.len() + 2)
                        .unwrap_or(candidate.len());
                    return Err(BridgeError::UnknownPlaceholder {
                        marker: candidate[..end].to_string(),
                    });
                }
            }
        }
        Ok(Self { text })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BridgeError::io(path, e))?;
        Self::parse(text)
    }

    pub fn render(&self, runner_src: &str, mock_src: &str, inline: &str) -> String {
        let html = fill_placeholder(&self.text, RUNNER_MARKER, runner_src);
        let html = fill_placeholder(&html, MOCK_MARKER, mock_src);
        fill_placeholder(&html, SCRIPTS_MARKER, inline)
    }
}

/// Writes suites into the output directory
pub struct SuiteGenerator {
    root: PathBuf,
    output: PathBuf,
    template: SuiteTemplate,
    runner_src: String,
    mock_src: String,
}

impl SuiteGenerator {
    /// Script references are made relative to the output directory.
    pub fn new(
        root: &Path,
        output: &Path,
        template: SuiteTemplate,
        runner_script: &Path,
        mock_script: &Path,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            output: output.to_path_buf(),
            template,
            runner_src: script_reference(output, runner_script),
            mock_src: script_reference(output, mock_script),
        }
    }

    pub fn suite_path(&self, entry: &str) -> PathBuf {
        self.output.join(format!("{}.html", entry))
    }

    pub fn render(&self, source: &str, shared: &str) -> String {
        let inline = format!(
            "<script>\n{}{}\n</script>",
            escape_script_close(shared),
            escape_script_close(source)
        );
        self.template.render(&self.runner_src, &self.mock_src, &inline)
    }

    /// Write the suite for `entry`, replacing any previous version.
    ///
    /// Returns the suite path relative to the working root.
    pub fn generate(&self, entry: &str, source: &str, shared: &str) -> Result<PathBuf> {
        let path = self.suite_path(entry);
        let html = self.render(source, shared);

        let staging = self.output.join(format!(".{}.html.tmp", entry));
        fs::write(&staging, html).map_err(|e| BridgeError::io(&staging, e))?;
        if let Err(e) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(BridgeError::io(&path, e));
        }

        tracing::debug!("wrote suite {}", path.display());
        Ok(pathdiff::diff_paths(&path, &self.root).unwrap_or(path))
    }
}

fn script_reference(output: &Path, script: &Path) -> String {
    pathdiff::diff_paths(script, output)
        .unwrap_or_else(|| script.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

/// Suites known to the runner. Grows across cycles, never shrinks.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SuiteSet {
    suites: Vec<PathBuf>,
}

impl SuiteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the suite was already known.
    pub fn insert(&mut self, suite: PathBuf) -> bool {
        if self.suites.contains(&suite) {
            return false;
        }
        self.suites.push(suite);
        true
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.suites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generator(root: &Path) -> SuiteGenerator {
        let output = root.join("__build_tests");
        fs::create_dir_all(&output).unwrap();
        SuiteGenerator::new(
            root,
            &output,
            SuiteTemplate::builtin(),
            &root.join("node_modules/web-component-tester/browser.js"),
            &root.join("node_modules/fetch-mock/dist/es5/client-bundle.js"),
        )
    }

    #[test]
    fn test_fill_placeholder_is_exhaustive() {
        for n in [0usize, 1, 3] {
            let template = format!("<p>{}</p>", vec![SCRIPTS_MARKER; n].join(" | "));
            let out = fill_placeholder(&template, SCRIPTS_MARKER, "X");
            assert_eq!(out.matches(SCRIPTS_MARKER).count(), 0);
            assert_eq!(out.matches('X').count(), n);
        }
    }

    #[test]
    fn test_fill_placeholder_does_not_rescan() {
        let out = fill_placeholder("a MARK b", "MARK", "MARK MARK");
        assert_eq!(out, "a MARK MARK b");
    }

    #[test]
    fn test_builtin_template_has_all_markers() {
        let template = SuiteTemplate::builtin();
        for marker in KNOWN_MARKERS {
            assert!(template.text.contains(marker));
        }
        assert_eq!(SuiteTemplate::parse(template.text.clone()).unwrap(), template);
    }

    #[test]
    fn test_parse_rejects_unknown_marker() {
        let err = SuiteTemplate::parse("<p>@@suitebridge:styles@@</p>").unwrap_err();
        match err {
            BridgeError::UnknownPlaceholder { marker } => {
                assert_eq!(marker, "@@suitebridge:styles@@")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_escape_script_close() {
        assert_eq!(
            escape_script_close("var s = '</script>'; var t = '</SCRIPT>';"),
            "var s = '<\\/script>'; var t = '<\\/SCRIPT>';"
        );
        assert_eq!(escape_script_close("a < b"), "a < b");
    }

    #[test]
    fn test_render_fills_every_marker() {
        let temp_dir = TempDir::new().unwrap();
        let html = generator(temp_dir.path()).render("describe('a');", "var shared;\n");

        assert!(!html.contains(MARKER_NAMESPACE));
        assert!(html.contains(
            "<script src=\"../node_modules/web-component-tester/browser.js\"></script>"
        ));
        assert!(html.contains("../node_modules/fetch-mock/dist/es5/client-bundle.js"));
        assert!(html.contains("<script>\nvar shared;\ndescribe('a');\n</script>"));
    }

    #[test]
    fn test_generate_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let generator = generator(temp_dir.path());

        let first = generator.generate("SuiteBridge-1", "test()", "").unwrap();
        let first_bytes = fs::read(temp_dir.path().join(&first)).unwrap();
        let second = generator.generate("SuiteBridge-1", "test()", "").unwrap();
        let second_bytes = fs::read(temp_dir.path().join(&second)).unwrap();

        assert_eq!(first, PathBuf::from("__build_tests/SuiteBridge-1.html"));
        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_generate_overwrites_previous() {
        let temp_dir = TempDir::new().unwrap();
        let generator = generator(temp_dir.path());

        generator.generate("SuiteBridge-1", "old()", "").unwrap();
        let suite = generator.generate("SuiteBridge-1", "new()", "").unwrap();
        let html = fs::read_to_string(temp_dir.path().join(suite)).unwrap();
        assert!(html.contains("new()"));
        assert!(!html.contains("old()"));
    }

    #[test]
    fn test_generate_into_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let generator = SuiteGenerator::new(
            temp_dir.path(),
            &temp_dir.path().join("missing"),
            SuiteTemplate::builtin(),
            Path::new("/a.js"),
            Path::new("/b.js"),
        );
        assert!(generator.generate("SuiteBridge-1", "", "").is_err());
    }

    #[test]
    fn test_suite_set_dedupes() {
        let mut suites = SuiteSet::new();
        assert!(suites.insert(PathBuf::from("out/a.html")));
        assert!(!suites.insert(PathBuf::from("out/a.html")));
        assert!(suites.insert(PathBuf::from("out/b.html")));
        assert_eq!(suites.len(), 2);
    }
}
