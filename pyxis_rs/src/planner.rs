//! Build planning: pattern expansion, recompile decisions, priorities.
//!
//! The planner turns glob patterns and descriptor templates into a list of
//! extension modules, then decides per module source whether the generated
//! translation unit is stale. Decisions run off mtimes; the content
//! fingerprint only keys the artifact cache, it never forces work.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::glob::extended_glob;
use crate::graph::{DependencyTree, normalize};
use crate::types::{BuildOptions, ExtensionModule, Pattern, Priority, WorkItem};

/// Extensions this driver may translate.
const SOURCE_EXTENSIONS: &[&str] = &["pyx", "py"];

fn is_driver_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Expand build patterns into concrete extension modules.
///
/// A glob pattern yields one module per matched file, named by its fully
/// qualified package path. A descriptor acts as a template: its `name` may
/// carry a `*` (resolved per file), its trailing sources are appended
/// verbatim, and its settings merge underneath the per-file directives. A
/// descriptor whose first source is not driver-eligible passes through
/// unchanged. Modules de-duplicate on the resolved name.
pub fn create_module_list(
    tree: &DependencyTree,
    patterns: &[Pattern],
    options: &BuildOptions,
) -> Result<Vec<ExtensionModule>> {
    let mut excluded = HashSet::new();
    for pattern in &options.exclude {
        for path in extended_glob(pattern)? {
            excluded.insert(normalize(&path));
        }
    }

    let mut seen = HashSet::new();
    let mut modules = Vec::new();
    for pattern in patterns {
        let (file_pattern, template) = match pattern {
            Pattern::Glob(glob) => (glob.clone(), None),
            Pattern::Module(module) => match module.sources.first() {
                Some(first) if is_driver_source(first) => {
                    (first.to_string_lossy().into_owned(), Some(module))
                }
                _ => {
                    modules.push(module.clone());
                    continue;
                }
            },
        };
        let base = template.map(|template| template.settings.template_base());
        let name_template = template.map_or("*", |template| template.name.as_str());

        for file in extended_glob(&file_pattern)? {
            let file = normalize(&file);
            if excluded.contains(&file) {
                continue;
            }
            let module_name = if name_template.contains('*') {
                tree.fully_qualified_name(&file)
            } else {
                name_template.to_string()
            };
            if !seen.insert(module_name.clone()) {
                continue;
            }
            let mut settings =
                tree.distutils_info(&file, options.aliases.as_ref(), base.as_ref())?;
            if let Some(base) = &base {
                settings.fill_missing_from(base);
            }
            let mut sources = vec![file];
            if let Some(template) = template {
                sources.extend(template.sources.iter().skip(1).cloned());
            }
            modules.push(ExtensionModule {
                name: module_name,
                sources,
                settings,
            });
        }
    }
    Ok(modules)
}

/// The planned build: the final module list (driver-eligible sources
/// rewritten to their generated files) and the sorted work queue.
#[derive(Debug, Default)]
pub struct BuildPlan {
    pub modules: Vec<ExtensionModule>,
    pub work: Vec<WorkItem>,
}

/// Expand patterns and decide which units need regeneration.
pub fn create_build_plan(
    tree: &DependencyTree,
    patterns: &[Pattern],
    options: &BuildOptions,
) -> Result<BuildPlan> {
    let mut modules = create_module_list(tree, patterns, options)?;
    let mut work = Vec::new();
    for module in &mut modules {
        let cplus = options.cplus || module.language() == Some("c++");
        let language = module.language().map(str::to_string);
        let mut new_sources = Vec::with_capacity(module.sources.len());
        for source in &module.sources {
            if !is_driver_source(source) {
                new_sources.push(source.clone());
                continue;
            }
            let c_file = source.with_extension(if cplus { "cpp" } else { "c" });
            if let Some(item) =
                plan_one(tree, source, &c_file, cplus, language.as_deref(), options)?
            {
                work.push(item);
            }
            new_sources.push(c_file);
        }
        module.sources = new_sources;
    }
    work.sort_by(|a, b| (a.priority, &a.source).cmp(&(b.priority, &b.source)));
    Ok(BuildPlan { modules, work })
}

/// The recompile decision for one source.
///
/// Stale when the generated file is older than the source itself
/// (priority 0), a direct dependency (priority 1) or a transitive one
/// (priority 2); `force` overrides. Fingerprints are computed only when a
/// cache is configured and `force` is off.
fn plan_one(
    tree: &DependencyTree,
    source: &Path,
    c_file: &Path,
    cplus: bool,
    language: Option<&str>,
    options: &BuildOptions,
) -> Result<Option<WorkItem>> {
    let c_mtime = fs::metadata(c_file).and_then(|meta| meta.modified()).ok();
    let source_mtime = tree.timestamp(source)?;

    let (trigger_mtime, trigger, priority) = if c_mtime.is_none_or(|c| c < source_mtime) {
        (source_mtime, source.to_path_buf(), Priority::Source)
    } else {
        let (dep_mtime, dep) = tree.newest_dependency(source)?;
        let priority = if tree.immediate_dependencies(source)?.contains(&dep) {
            Priority::Direct
        } else {
            Priority::Transitive
        };
        (dep_mtime, dep, priority)
    };

    if !options.force && c_mtime.is_some_and(|c| c >= trigger_mtime) {
        return Ok(None);
    }

    if !options.quiet {
        if trigger == source {
            println!("Compiling {} because it changed.", source.display());
        } else {
            println!(
                "Compiling {} because it depends on {}.",
                source.display(),
                trigger.display()
            );
        }
    }
    let fingerprint = if !options.force && options.cache.is_some() {
        tree.transitive_fingerprint(source, language)?
    } else {
        None
    };
    Ok(Some(WorkItem {
        priority,
        source: source.to_path_buf(),
        c_file: c_file.to_path_buf(),
        fingerprint,
        cplus,
    }))
}
