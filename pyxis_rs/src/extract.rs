//! Cheap per-file dependency extraction.
//!
//! Running the real front-end just to learn what a module imports is far
//! too slow for planning, so dependencies are pulled with line-anchored
//! regexes over a scrubbed buffer (comments and string literals already
//! replaced by labels, see [`crate::literals`]).

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::literals::{LABEL_PREFIX, LiteralTable, strip_string_literals};
use crate::settings::BuildSettings;

/// Direct dependency references and build settings for one source file.
#[derive(Clone, Debug, Default)]
pub struct SourceDependencies {
    /// Module names pulled in with `cimport` / `from … cimport`.
    pub cimports: Vec<String>,
    /// Files pulled in textually with `include "…"`.
    pub includes: Vec<String>,
    /// External C/C++ headers named by `cdef extern from "…"`.
    pub externs: Vec<String>,
    pub settings: BuildSettings,
}

fn dependency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // One alternation, one pass. Groups: 1 cimport-from, 2 cimport,
        // 3 extern header label, 4 include label.
        Regex::new(
            r#"(?m)(?:^from +([0-9a-zA-Z_.]+) +cimport)|(?:^cimport +([0-9a-zA-Z_.]+)\b)|(?:^cdef +extern +from +['"]([^'"]+)['"])|(?:^include +['"]([^'"]+)['"])"#,
        )
        .expect("valid regex literal")
    })
}

/// Parse one source file for its direct dependencies and settings.
///
/// The file is read best-effort: bytes that do not decode as UTF-8 are
/// replaced, which is harmless for the line-anchored patterns above.
pub fn parse_dependencies(path: &Path) -> Result<SourceDependencies> {
    let raw = fs::read(path)?;
    let source = String::from_utf8_lossy(&raw);
    extract(&source)
}

pub(crate) fn extract(source: &str) -> Result<SourceDependencies> {
    let settings = BuildSettings::from_source(source)?;
    let (scrubbed, literals) = strip_string_literals(source, LABEL_PREFIX);
    // Line continuations and tabs would defeat the `^`-anchored patterns.
    let scrubbed = scrubbed.replace("\\\n", " ").replace('\t', " ");

    let mut deps = SourceDependencies {
        settings,
        ..Default::default()
    };
    for caps in dependency_regex().captures_iter(&scrubbed) {
        if let Some(module) = caps.get(1).or_else(|| caps.get(2)) {
            deps.cimports.push(module.as_str().to_string());
        } else if let Some(label) = caps.get(3) {
            push_restored(&mut deps.externs, label.as_str(), &literals);
        } else if let Some(label) = caps.get(4) {
            push_restored(&mut deps.includes, label.as_str(), &literals);
        }
    }
    Ok(deps)
}

/// Quoted paths come out of the regex as scrub labels; restore the original.
fn push_restored(out: &mut Vec<String>, label: &str, literals: &LiteralTable) {
    if let Some(original) = literals.get(label) {
        out.push(original.clone());
    }
}
