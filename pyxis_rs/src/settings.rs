//! Build settings carried in `# distutils:` directive comments.
//!
//! A module source may open with a run of blank lines and comments; any of
//! those comments of the form `# distutils: key = value` contribute build
//! settings for the module. Settings merge across the dependency closure
//! according to their [`SettingKind`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::literals::{LiteralTable, strip_string_literals};

/// How a setting participates in merges across the dependency closure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKind {
    /// Last writer wins; never promoted from dependencies.
    Scalar,
    /// List-valued; never promoted from dependencies.
    List,
    /// Adopted from a dependency only when unset locally.
    TransitiveScalar,
    /// Union-append across dependencies, first-seen order, deduplicated.
    TransitiveList,
}

const SETTING_TABLE: &[(&str, SettingKind)] = &[
    ("name", SettingKind::Scalar),
    ("sources", SettingKind::List),
    ("define_macros", SettingKind::List),
    ("undef_macros", SettingKind::List),
    ("libraries", SettingKind::TransitiveList),
    ("library_dirs", SettingKind::TransitiveList),
    ("runtime_library_dirs", SettingKind::TransitiveList),
    ("include_dirs", SettingKind::TransitiveList),
    ("extra_objects", SettingKind::List),
    ("extra_compile_args", SettingKind::TransitiveList),
    ("extra_link_args", SettingKind::TransitiveList),
    ("export_symbols", SettingKind::List),
    ("depends", SettingKind::TransitiveList),
    ("language", SettingKind::TransitiveScalar),
];

/// Aggregation kind for a recognised setting key, `None` for unknown keys.
pub fn setting_kind(key: &str) -> Option<SettingKind> {
    SETTING_TABLE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

/// A single setting value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Scalar(String),
    List(Vec<String>),
    /// `define_macros` entries: `NAME` or `NAME=VALUE`.
    Macros(Vec<(String, Option<String>)>),
}

/// Alias substitution target: one replacement, or a list spliced in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasValue {
    One(String),
    Many(Vec<String>),
}

/// Alias map applied to settings via [`BuildSettings::subs`].
pub type Aliases = HashMap<String, AliasValue>;

/// Build settings for one module, keyed by the recognised setting names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(flatten)]
    values: BTreeMap<String, SettingValue>,
}

impl BuildSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the directive prologue of a source buffer.
    ///
    /// Scanning accepts only a leading run of blank lines and comment
    /// lines; the first other line ends it. An unknown key or a directive
    /// without `=` is fatal.
    pub fn from_source(source: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for line in source.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                break;
            }
            let Some(comment) = line.strip_prefix('#') else {
                continue;
            };
            let Some(directive) = comment.trim().strip_prefix("distutils:") else {
                continue;
            };
            let (key, value) = directive
                .split_once('=')
                .ok_or_else(|| BuildError::MalformedDirective(directive.trim().to_string()))?;
            let key = key.trim();
            let value = value.trim();
            let kind =
                setting_kind(key).ok_or_else(|| BuildError::UnknownSetting(key.to_string()))?;
            let parsed = match kind {
                SettingKind::List | SettingKind::TransitiveList => {
                    let items = parse_list(value);
                    if key == "define_macros" {
                        SettingValue::Macros(items.iter().map(|m| split_macro(m)).collect())
                    } else {
                        SettingValue::List(items)
                    }
                }
                SettingKind::Scalar | SettingKind::TransitiveScalar => {
                    SettingValue::Scalar(value.to_string())
                }
            };
            values.insert(key.to_string(), parsed);
        }
        Ok(Self { values })
    }

    /// Merge a dependency's settings into ours.
    ///
    /// Only transitive kinds propagate: transitive scalars fill gaps,
    /// transitive lists union-append preserving first-seen order.
    pub fn merged(mut self, other: &BuildSettings) -> Self {
        for (key, value) in &other.values {
            match setting_kind(key) {
                Some(SettingKind::TransitiveScalar) => {
                    if !self.values.contains_key(key) {
                        self.values.insert(key.clone(), value.clone());
                    }
                }
                Some(SettingKind::TransitiveList) => {
                    if !self.values.contains_key(key) {
                        self.values.insert(key.clone(), value.clone());
                    } else if let (Some(SettingValue::List(existing)), SettingValue::List(items)) =
                        (self.values.get_mut(key), value)
                    {
                        for item in items {
                            if !existing.contains(item) {
                                existing.push(item.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        self
    }

    /// Apply alias substitution.
    ///
    /// List elements naming an alias are replaced, with list-valued aliases
    /// spliced in place. A scalar value is replaced only by a single-string
    /// alias. Macro pairs are never rewritten.
    pub fn subs(&self, aliases: Option<&Aliases>) -> Self {
        let Some(aliases) = aliases else {
            return self.clone();
        };
        let values = self
            .values
            .iter()
            .map(|(key, value)| {
                let substituted = match value {
                    SettingValue::List(items) => {
                        let mut out = Vec::new();
                        for item in items {
                            match aliases.get(item) {
                                Some(AliasValue::One(v)) => out.push(v.clone()),
                                Some(AliasValue::Many(vs)) => out.extend(vs.iter().cloned()),
                                None => out.push(item.clone()),
                            }
                        }
                        SettingValue::List(out)
                    }
                    SettingValue::Scalar(v) => match aliases.get(v) {
                        Some(AliasValue::One(sub)) => SettingValue::Scalar(sub.clone()),
                        _ => value.clone(),
                    },
                    SettingValue::Macros(_) => value.clone(),
                };
                (key.clone(), substituted)
            })
            .collect();
        Self { values }
    }

    /// Fill unset keys from a template base (descriptor-supplied settings).
    pub fn fill_missing_from(&mut self, base: &BuildSettings) {
        for (key, value) in &base.values {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// The settings usable as a merge base when a descriptor acts as a
    /// template. `name` and `sources` stay with the descriptor itself.
    pub fn template_base(&self) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "sources")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `language` setting, when present.
    pub fn language(&self) -> Option<&str> {
        match self.values.get("language") {
            Some(SettingValue::Scalar(language)) => Some(language.as_str()),
            _ => None,
        }
    }
}

/// Split a directive value into items.
///
/// `[a, b, c]` splits on commas, anything else on whitespace. Quoted items
/// keep their separators: the value is scrubbed first, split on the
/// unquoted text, and each quoted piece restored from the literal table.
pub fn parse_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let (body, delimiter) =
        if trimmed.len() >= 2 && trimmed.starts_with('[') && trimmed.ends_with(']') {
            (&trimmed[1..trimmed.len() - 1], ',')
        } else {
            (trimmed, ' ')
        };
    let (scrubbed, literals) = strip_string_literals(body, "__pyx_arg_");
    scrubbed
        .split(delimiter)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| unquote(item, &literals))
        .collect()
}

fn unquote(item: &str, literals: &LiteralTable) -> String {
    let label = item
        .strip_prefix(['\'', '"'])
        .and_then(|rest| rest.strip_suffix(['\'', '"']));
    match label.and_then(|label| literals.get(label)) {
        Some(original) => original.clone(),
        None => item.to_string(),
    }
}

fn split_macro(item: &str) -> (String, Option<String>) {
    match item.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (item.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(settings: &BuildSettings, key: &str) -> Vec<String> {
        match settings.get(key) {
            Some(SettingValue::List(items)) => items.clone(),
            other => panic!("expected list for {key}, got {other:?}"),
        }
    }

    #[test]
    fn parse_list_whitespace_form() {
        assert_eq!(parse_list("a b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_list_bracket_form() {
        assert_eq!(parse_list("[a, b, c]"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_list_quoted_whitespace_item() {
        assert_eq!(parse_list("a \" \" b"), vec!["a", " ", "b"]);
    }

    #[test]
    fn parse_list_quoted_separators_do_not_split() {
        assert_eq!(
            parse_list(r#"[a, ",a", "a,", ",", ]"#),
            vec!["a", ",a", "a,", ","]
        );
    }

    #[test]
    fn directive_with_quoted_list_item() {
        let settings =
            BuildSettings::from_source("# distutils: libraries = [m, \"c d\"]\n").unwrap();
        assert_eq!(list(&settings, "libraries"), vec!["m", "c d"]);
    }

    #[test]
    fn both_list_forms_parse_to_the_same_items() {
        let bracket =
            BuildSettings::from_source("# distutils: libraries = [m, z]\n").unwrap();
        let bare = BuildSettings::from_source("# distutils: libraries = m z\n").unwrap();
        assert_eq!(bracket, bare);
    }

    #[test]
    fn unknown_key_is_fatal() {
        let err = BuildSettings::from_source("# distutils: warp_drive = on\n").unwrap_err();
        assert!(matches!(err, BuildError::UnknownSetting(key) if key == "warp_drive"));
    }

    #[test]
    fn directive_without_equals_is_fatal() {
        let err = BuildSettings::from_source("# distutils: libraries\n").unwrap_err();
        assert!(matches!(err, BuildError::MalformedDirective(_)));
    }

    #[test]
    fn scanning_stops_at_first_code_line() {
        let source = "# distutils: libraries = m\nimport os\n# distutils: libraries = z\n";
        let settings = BuildSettings::from_source(source).unwrap();
        assert_eq!(list(&settings, "libraries"), vec!["m"]);
    }

    #[test]
    fn blank_lines_in_the_prologue_are_allowed() {
        let source = "\n\n# distutils: language = c++\n";
        let settings = BuildSettings::from_source(source).unwrap();
        assert_eq!(settings.language(), Some("c++"));
    }

    #[test]
    fn define_macros_split_into_pairs() {
        let settings =
            BuildSettings::from_source("# distutils: define_macros = FOO BAR=1\n").unwrap();
        assert_eq!(
            settings.get("define_macros"),
            Some(&SettingValue::Macros(vec![
                ("FOO".to_string(), None),
                ("BAR".to_string(), Some("1".to_string())),
            ]))
        );
    }

    #[test]
    fn merge_promotes_transitive_lists_in_first_seen_order() {
        let mut ours = BuildSettings::new();
        ours.set(
            "libraries",
            SettingValue::List(vec!["m".to_string(), "z".to_string()]),
        );
        let mut theirs = BuildSettings::new();
        theirs.set(
            "libraries",
            SettingValue::List(vec!["z".to_string(), "ssl".to_string()]),
        );
        let merged = ours.merged(&theirs);
        assert_eq!(list(&merged, "libraries"), vec!["m", "z", "ssl"]);
    }

    #[test]
    fn merge_adopts_transitive_scalar_only_when_unset() {
        let mut child = BuildSettings::new();
        child.set("language", SettingValue::Scalar("c++".to_string()));

        let adopted = BuildSettings::new().merged(&child);
        assert_eq!(adopted.language(), Some("c++"));

        let mut parent = BuildSettings::new();
        parent.set("language", SettingValue::Scalar("c".to_string()));
        let kept = parent.merged(&child);
        assert_eq!(kept.language(), Some("c"));
    }

    #[test]
    fn merge_never_promotes_non_transitive_kinds() {
        let mut child = BuildSettings::new();
        child.set("name", SettingValue::Scalar("dep".to_string()));
        child.set(
            "export_symbols",
            SettingValue::List(vec!["init".to_string()]),
        );
        let merged = BuildSettings::new().merged(&child);
        assert!(merged.is_empty());
    }

    #[test]
    fn subs_splices_list_valued_aliases() {
        let mut settings = BuildSettings::new();
        settings.set(
            "include_dirs",
            SettingValue::List(vec!["NUMPY".to_string(), "vendor".to_string()]),
        );
        let mut aliases = Aliases::new();
        aliases.insert(
            "NUMPY".to_string(),
            AliasValue::Many(vec!["/np/core".to_string(), "/np/extra".to_string()]),
        );
        let substituted = settings.subs(Some(&aliases));
        assert_eq!(
            list(&substituted, "include_dirs"),
            vec!["/np/core", "/np/extra", "vendor"]
        );
    }

    #[test]
    fn subs_replaces_scalar_by_single_alias_only() {
        let mut settings = BuildSettings::new();
        settings.set("language", SettingValue::Scalar("LANG".to_string()));
        let mut aliases = Aliases::new();
        aliases.insert("LANG".to_string(), AliasValue::One("c++".to_string()));
        assert_eq!(settings.subs(Some(&aliases)).language(), Some("c++"));
    }

    #[test]
    fn fill_missing_keeps_own_values() {
        let mut settings = BuildSettings::new();
        settings.set("language", SettingValue::Scalar("c".to_string()));
        let mut base = BuildSettings::new();
        base.set("language", SettingValue::Scalar("c++".to_string()));
        base.set(
            "libraries",
            SettingValue::List(vec!["m".to_string()]),
        );
        settings.fill_missing_from(&base);
        assert_eq!(settings.language(), Some("c"));
        assert_eq!(list(&settings, "libraries"), vec!["m"]);
    }

    #[test]
    fn template_base_drops_name_and_sources() {
        let mut settings = BuildSettings::new();
        settings.set("name", SettingValue::Scalar("pkg.mod".to_string()));
        settings.set(
            "sources",
            SettingValue::List(vec!["extra.c".to_string()]),
        );
        settings.set("libraries", SettingValue::List(vec!["m".to_string()]));
        let base = settings.template_base();
        assert!(base.get("name").is_none());
        assert!(base.get("sources").is_none());
        assert_eq!(list(&base, "libraries"), vec!["m"]);
    }
}
