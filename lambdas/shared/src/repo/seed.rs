//! Seed tree for new pattern repositories
//!
//! Files live under `{template_root}/{cdk|cfn}/` and are rendered with a tiny
//! `{{ name }}` substitution before being committed.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::errors::{Error, Result};
use crate::models::PatternType;

/// One file of the initial commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub content: Vec<u8>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"))
}

/// Substitute `{{ name }}` placeholders; unknown names are left untouched
pub fn render(content: &str, vars: &HashMap<&str, &str>) -> String {
    placeholder_regex()
        .replace_all(content, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Load and render every file of the seed tree for a pattern type
///
/// Non UTF-8 files are committed verbatim. Files come back sorted by path.
pub fn load_seed_files(
    template_root: &Path,
    pattern_type: PatternType,
    branch_name: &str,
) -> Result<Vec<SeedFile>> {
    let root = template_root.join(pattern_type.seed_dir());
    if !root.is_dir() {
        return Err(Error::Repository(format!(
            "Seed directory not found: {}",
            root.display()
        )));
    }

    let vars = HashMap::from([("branchName", branch_name)]);
    let mut files = Vec::new();

    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = entry.map_err(|e| Error::Repository(format!("Failed to read seed tree: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&root)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let raw = std::fs::read(entry.path())
            .map_err(|e| Error::Repository(format!("Failed to read {}: {}", path, e)))?;
        let content = match String::from_utf8(raw) {
            Ok(text) => render(&text, &vars).into_bytes(),
            Err(e) => e.into_bytes(),
        };

        files.push(SeedFile { path, content });
    }

    if files.is_empty() {
        return Err(Error::Repository(format!(
            "Seed directory is empty: {}",
            root.display()
        )));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
