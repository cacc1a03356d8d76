//! Pattern expansion with `**` support.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::error::Result;

/// Expand one pattern to the files it matches.
///
/// `*`, `?` and `[…]` match within a single path component; a `**`
/// component matches zero or more directories. Matches are de-duplicated
/// through a seen-set and returned sorted. A pattern without
/// metacharacters is a plain existence probe.
pub fn extended_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    if !has_meta(pattern) {
        let path = PathBuf::from(pattern);
        return Ok(if path.is_file() { vec![path] } else { Vec::new() });
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let root = literal_prefix(pattern);

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for entry in WalkDir::new(&root).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().strip_prefix("./").unwrap_or(entry.path());
        if matcher.is_match(path) && seen.insert(path.to_path_buf()) {
            matches.push(path.to_path_buf());
        }
    }
    matches.sort();
    Ok(matches)
}

fn has_meta(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Directory components strictly before the first wildcard; the walk
/// starts there instead of the filesystem root.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let components = Path::new(pattern)
        .parent()
        .map(Path::components)
        .into_iter()
        .flatten();
    for component in components {
        if has_meta(&component.as_os_str().to_string_lossy()) {
            break;
        }
        prefix.push(component);
    }
    if prefix.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        prefix
    }
}
