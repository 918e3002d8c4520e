//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the tests in `tests/`:
//! - No blocking I/O inside async functions
//! - No sleep() outside the push channel's reconnect delay
//!
//! The scanners are line based. They are meant to catch regressions early,
//! not to parse Rust.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every rule
pub const PRODUCTION_DIRS: &[&str] = &["thinkstream/core/src", "thinkstream/cli/src"];

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// A loaded source file
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File content split into lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Number of leading lines that are production code
    ///
    /// Everything from the first `#[cfg(test)]` onward is treated as test
    /// code; test modules sit at the bottom of each file.
    #[must_use]
    pub fn production_len(&self) -> usize {
        self.lines
            .iter()
            .position(|line| line.trim_start().starts_with("#[cfg(test)]"))
            .unwrap_or(self.lines.len())
    }

    /// Production lines with their 1-based line numbers, comments stripped
    pub fn production_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines[..self.production_len()]
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx + 1, strip_comment(line)))
    }

    /// Format a violation at `line_number`
    #[must_use]
    pub fn violation(&self, line_number: usize, what: &str) -> String {
        let line = self
            .lines
            .get(line_number - 1)
            .map_or("", |l| l.trim());
        format!("{}:{} - {}: {}", self.path.display(), line_number, what, line)
    }
}

/// Load every `.rs` file under the production directories
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(SourceFile {
                path: relative,
                lines: content.lines().map(str::to_string).collect(),
            });
        }
    }

    files
}

/// Drop a trailing `//` comment (and doc comments entirely)
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function enclosing a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enclosing {
    /// `async fn` (any visibility)
    Async,
    /// Plain `fn` (any visibility)
    Sync,
    /// No function found before a module or impl boundary
    None,
}

/// Find the nearest function signature at or above `current_idx`
#[must_use]
pub fn enclosing_function<S: AsRef<str>>(lines: &[S], current_idx: usize) -> Enclosing {
    for line in lines[..=current_idx.min(lines.len().saturating_sub(1))]
        .iter()
        .rev()
    {
        let line = strip_comment(line.as_ref()).trim();
        let signature = strip_visibility(line);

        if signature.starts_with("async fn ") {
            return Enclosing::Async;
        }
        if signature.starts_with("fn ") || signature.starts_with("const fn ") {
            return Enclosing::Sync;
        }

        if signature.starts_with("mod ") || (signature.starts_with("impl") && line.contains('{')) {
            return Enclosing::None;
        }
    }
    Enclosing::None
}

fn strip_visibility(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("pub(crate) ") {
        return rest;
    }
    if let Some(rest) = line.strip_prefix("pub(super) ") {
        return rest;
    }
    line.strip_prefix("pub ").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosing_async_with_visibility() {
        let code = [
            "pub async fn connect(&self) {",
            "    let x = 1;",
            "}",
        ];
        assert_eq!(enclosing_function(&code, 1), Enclosing::Async);

        let code = ["pub(crate) fn load() {", "    read();", "}"];
        assert_eq!(enclosing_function(&code, 1), Enclosing::Sync);
    }

    #[test]
    fn test_impl_boundary_stops_scan() {
        let code = ["async fn a() {}", "impl Foo {", "    const X: u8 = 1;"];
        assert_eq!(enclosing_function(&code, 2), Enclosing::None);
    }

    #[test]
    fn test_production_len_stops_at_test_module() {
        let file = SourceFile {
            path: PathBuf::from("x.rs"),
            lines: vec![
                "fn a() {}".into(),
                "#[cfg(test)]".into(),
                "mod tests {}".into(),
            ],
        };
        assert_eq!(file.production_len(), 1);
        assert_eq!(file.production_lines().count(), 1);
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("let a = 1; // std::fs::read"), "let a = 1; ");
        assert_eq!(strip_comment("//! std::net docs"), "");
    }

    #[test]
    fn test_production_dirs_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
    }
}
