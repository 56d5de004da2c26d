//! Local source reconciliation
//!
//! Walks the component source tree, applies ignore patterns, and narrows the
//! set to files changed since the last successful sync. Paths are returned
//! relative to the source base so the platform client can mirror the layout
//! remotely.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Matcher over ignore patterns.
///
/// Patterns match against slash-separated paths relative to the source base.
/// `*` matches within a path component, a pattern without a slash matches
/// any component of the path. `.git` and the `.devctl` config directory are
/// always ignored.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<String>,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.to_vec(),
        }
    }

    pub fn is_ignored(&self, relative: &Path) -> bool {
        let rel = relative.to_string_lossy().replace('\\', "/");
        let components: Vec<&str> = rel.split('/').collect();

        if components
            .iter()
            .any(|c| *c == ".git" || *c == ".devctl")
        {
            return true;
        }

        for pattern in &self.patterns {
            let pattern = pattern.trim_matches('/');
            if pattern.is_empty() {
                continue;
            }
            if pattern.contains('/') {
                // Path pattern: match against the leading portion of the path
                let pat_components: Vec<&str> = pattern.split('/').collect();
                if pat_components.len() <= components.len()
                    && pat_components
                        .iter()
                        .zip(&components)
                        .all(|(p, c)| glob_match(p, c))
                {
                    return true;
                }
            } else if components.iter().any(|c| glob_match(pattern, c)) {
                return true;
            }
        }
        false
    }
}

/// Minimal glob over one path component: `*` matches any run, `?` one char.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative wildcard matching with a single backtrack point
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut mark) = (None, 0usize);
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Collect files under `base`, relative to it, that survive the ignore
/// matcher and (when `changed_since` is set) were modified after that
/// instant. `changed_since = None` selects everything.
pub async fn collect_files(
    base: &Path,
    matcher: &IgnoreMatcher,
    changed_since: Option<DateTime<Utc>>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![base.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading source directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = path
                .strip_prefix(base)
                .context("stripping source base prefix")?
                .to_path_buf();
            if matcher.is_ignored(&relative) {
                continue;
            }

            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(path);
            } else if meta.is_file() {
                if let Some(since) = changed_since {
                    let modified: DateTime<Utc> = meta
                        .modified()
                        .context("reading file modification time")?
                        .into();
                    if modified <= since {
                        continue;
                    }
                }
                files.push(relative);
            }
        }
    }

    files.sort();
    debug!(base = %base.display(), files = files.len(), "collected source files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*.log", "build.log"));
        assert!(glob_match("node_modules", "node_modules"));
        assert!(!glob_match("*.log", "build.txt"));
        assert!(glob_match("te?t", "test"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn test_git_always_ignored() {
        let matcher = IgnoreMatcher::default();
        assert!(matcher.is_ignored(Path::new(".git/config")));
        assert!(matcher.is_ignored(Path::new(".devctl/env.yaml")));
        assert!(!matcher.is_ignored(Path::new("src/main.js")));
    }

    #[test]
    fn test_name_and_path_patterns() {
        let matcher = IgnoreMatcher::new(&[
            "*.log".to_string(),
            "node_modules".to_string(),
            "build/out".to_string(),
        ]);
        assert!(matcher.is_ignored(Path::new("debug.log")));
        assert!(matcher.is_ignored(Path::new("deep/nested/trace.log")));
        assert!(matcher.is_ignored(Path::new("node_modules/pkg/index.js")));
        assert!(matcher.is_ignored(Path::new("build/out/app.js")));
        assert!(!matcher.is_ignored(Path::new("build/src/app.js")));
    }

    #[tokio::test]
    async fn test_collect_files_applies_ignores() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir_all(dir.path().join("src")).unwrap();
        stdfs::create_dir_all(dir.path().join(".git")).unwrap();
        stdfs::write(dir.path().join("src/app.js"), "x").unwrap();
        stdfs::write(dir.path().join("notes.log"), "x").unwrap();
        stdfs::write(dir.path().join(".git/HEAD"), "x").unwrap();

        let matcher = IgnoreMatcher::new(&["*.log".to_string()]);
        let files = collect_files(dir.path(), &matcher, None).await.unwrap();
        assert_eq!(files, vec![PathBuf::from("src/app.js")]);
    }

    #[tokio::test]
    async fn test_collect_files_changed_since() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("old.js"), "x").unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(5);
        let files = collect_files(dir.path(), &IgnoreMatcher::default(), Some(cutoff))
            .await
            .unwrap();
        assert!(files.is_empty());

        let past = Utc::now() - chrono::Duration::hours(1);
        let files = collect_files(dir.path(), &IgnoreMatcher::default(), Some(past))
            .await
            .unwrap();
        assert_eq!(files, vec![PathBuf::from("old.js")]);
    }
}
