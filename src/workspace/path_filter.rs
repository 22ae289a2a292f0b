//! Path filtering using .gitignore-style patterns
//!
//! Architecture: Service Layer - PathFilter decides which source files enter the compilation
//! - Patterns apply in order; the last matching pattern wins, `!` re-includes
//! - Patterns with a `/` match the whole path, others only the file name
//! - `.stacksignore` files are honored from the file's directory up to the filesystem root

use crate::domain::diagnostics::{StacksError, StacksResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub const DEFAULT_IGNORE_FILE: &str = ".stacksignore";

/// Decides whether a path should be analyzed
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<FilterPattern>,
    /// Name of the ignore files to honor, if any
    ignore_filename: Option<String>,
}

#[derive(Debug, Clone)]
struct FilterPattern {
    pattern: glob::Pattern,
    /// `!pattern`: re-include what an earlier pattern excluded
    is_include: bool,
    original: String,
}

impl FilterPattern {
    fn parse(line: &str) -> Result<Self, glob::PatternError> {
        let (is_include, body) = match line.strip_prefix('!') {
            Some(stripped) => (true, stripped),
            None => (false, line),
        };
        let normalized = body.trim_start_matches('/').trim_end_matches('/');
        Ok(Self { pattern: glob::Pattern::new(normalized)?, is_include, original: body.to_string() })
    }

    fn matches(&self, path: &Path) -> bool {
        if self.original.ends_with('/') {
            // directory pattern: match any ancestor directory of the path
            return path.ancestors().skip(1).any(|dir| self.matches_str(dir));
        }
        self.matches_str(path)
    }

    fn matches_str(&self, path: &Path) -> bool {
        if self.pattern.as_str().contains('/') {
            return self.pattern.matches(&path.to_string_lossy());
        }
        path.file_name().map(|name| self.pattern.matches(&name.to_string_lossy())).unwrap_or(false)
    }
}

impl PathFilter {
    /// Create a path filter from ordered patterns and an optional ignore file name
    pub fn new(patterns: Vec<String>, ignore_filename: Option<String>) -> StacksResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                FilterPattern::parse(p).map_err(|e| StacksError::pattern(format!("Invalid pattern '{p}': {e}")))
            })
            .collect::<StacksResult<Vec<_>>>()?;

        Ok(Self { patterns, ignore_filename })
    }

    /// Exclusions for .NET build output and generated code
    pub fn with_defaults() -> StacksResult<Self> {
        Self::new(
            vec![
                "**/bin/**".to_string(),
                "**/obj/**".to_string(),
                "**/.git/**".to_string(),
                "**/*.g.cs".to_string(),
                "**/*.Designer.cs".to_string(),
            ],
            Some(DEFAULT_IGNORE_FILE.to_string()),
        )
    }

    pub fn should_analyze<P: AsRef<Path>>(&self, path: P) -> StacksResult<bool> {
        let path = path.as_ref();

        let mut include = true;
        for pattern in &self.patterns {
            if pattern.matches(path) {
                include = pattern.is_include;
            }
        }
        if !include {
            return Ok(false);
        }

        match &self.ignore_filename {
            Some(name) => Ok(!self.is_ignored_by_files(path, name)?),
            None => Ok(true),
        }
    }

    /// Nearer ignore files are applied last and take precedence
    fn is_ignored_by_files(&self, path: &Path, ignore_filename: &str) -> StacksResult<bool> {
        let directories: Vec<&Path> = path.ancestors().skip(1).collect();
        let mut ignored = false;

        for dir in directories.into_iter().rev() {
            let ignore_file = dir.join(ignore_filename);
            if !ignore_file.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            for pattern in load_ignore_file(&ignore_file)? {
                if pattern.matches(relative) {
                    ignored = !pattern.is_include;
                }
            }
        }

        Ok(ignored)
    }

    /// All files under `root` that pass the filter, in walk order
    pub fn find_files<P: AsRef<Path>>(&self, root: P) -> StacksResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root.as_ref()).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && self.should_analyze(path)? {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    pub fn filter_paths<P: AsRef<Path>>(&self, paths: &[P]) -> StacksResult<Vec<PathBuf>> {
        let mut filtered = Vec::new();
        for path in paths {
            if self.should_analyze(path)? {
                filtered.push(path.as_ref().to_path_buf());
            }
        }
        Ok(filtered)
    }

    pub fn add_pattern(&mut self, pattern: String) -> StacksResult<()> {
        let parsed = FilterPattern::parse(&pattern)
            .map_err(|e| StacksError::pattern(format!("Invalid pattern '{pattern}': {e}")))?;
        self.patterns.push(parsed);
        Ok(())
    }

    /// Which configured patterns match `path`, for `--verbose` output
    pub fn debug_patterns<P: AsRef<Path>>(&self, path: P) -> Vec<String> {
        let path = path.as_ref();
        self.patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                format!(
                    "Pattern {}: {}{} -> {}",
                    i,
                    if pattern.is_include { "!" } else { "" },
                    pattern.original,
                    if pattern.matches(path) { "MATCH" } else { "no match" }
                )
            })
            .collect()
    }
}

fn load_ignore_file(path: &Path) -> StacksResult<Vec<FilterPattern>> {
    let content = fs::read_to_string(path)
        .map_err(|e| StacksError::config(format!("Failed to read ignore file '{}': {}", path.display(), e)))?;

    let mut patterns = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match FilterPattern::parse(line) {
            Ok(pattern) => patterns.push(pattern),
            Err(e) => warn!("Invalid pattern '{}' in {}: {}", line, path.display(), e),
        }
    }
    Ok(patterns)
}
