//! Architectural Enforcement
//!
//! Source scans shared by the enforcement tests in `tests/`:
//! - No sleeping in library or CLI code
//! - No blocking I/O on the async path
//!
//! Only production code is scanned. A file's `#[cfg(test)] mod` and
//! everything after it is treated as test code and skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Source roots of every workspace crate that ships code
pub const PRODUCTION_ROOTS: &[&str] = &["pump/core/src", "pump/cli/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line was found in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule the line broke
    pub rule: &'static str,
    /// The trimmed line itself
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// Workspace root, resolved from this crate's manifest directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Lines of `content` that belong to production code, paired with their
/// 1-based line numbers. Comments are stripped.
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let lines: Vec<&str> = content.lines().collect();
    let end = lines
        .windows(2)
        .position(|pair| pair[0].trim() == "#[cfg(test)]" && pair[1].trim().starts_with("mod "))
        .unwrap_or(lines.len());

    lines[..end]
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Apply `check` to every production line under [`PRODUCTION_ROOTS`]
///
/// `check` returns the name of the broken rule, if any. Files whose name is
/// in `exempt` are skipped.
pub fn scan<F>(exempt: &[&str], check: F) -> Vec<Violation>
where
    F: Fn(&str) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_ROOTS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if exempt.contains(&name) {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };

            for (line, code) in production_lines(&content) {
                if let Some(rule) = check(code) {
                    violations.push(Violation {
                        path: path.to_path_buf(),
                        line,
                        rule,
                        text: code.trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "use std::fs; // loader\n\n#[cfg(test)]\nfn probe() {}\nfn load() {}\n#[cfg(test)]\nmod tests { use std::fs; }\n";
        let lines = production_lines(source);

        assert_eq!(
            lines,
            vec![
                (1, "use std::fs; "),
                (3, "#[cfg(test)]"),
                (4, "fn probe() {}"),
                (5, "fn load() {}"),
            ]
        );
    }

    #[test]
    fn test_production_roots_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_ROOTS {
            assert!(root.join(dir).is_dir(), "missing source root: {dir}");
        }
    }
}
