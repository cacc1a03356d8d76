//! Top-level build driver: plan, then execute.

use crate::error::Result;
use crate::executor::{Compiler, compile_all};
use crate::graph::DependencyTree;
use crate::planner::{BuildPlan, create_build_plan};
use crate::resolve::Context;
use crate::types::{BuildOptions, ExtensionModule, Pattern};

/// Plan and run one incremental build.
///
/// Expands `patterns`, decides which units need regeneration, compiles
/// them through `compiler` (in parallel when requested), and returns the
/// extension modules with their driver-eligible sources rewritten to the
/// generated translation units.
///
/// Each call builds its own [`DependencyTree`]; nothing is shared between
/// builds except the artifact cache directory.
pub fn cythonize<C: Compiler>(
    patterns: &[Pattern],
    options: &BuildOptions,
    compiler: &C,
) -> Result<Vec<ExtensionModule>> {
    let tree = DependencyTree::new(Context::new(options.include_path.clone()));
    let plan = create_build_plan(&tree, patterns, options)?;
    compile_all(compiler, &plan.work, options)?;
    Ok(plan.modules)
}

/// Plan without compiling. Backs the CLI's `--list` surface and lets
/// callers inspect the work queue a build would run.
pub fn plan_build(patterns: &[Pattern], options: &BuildOptions) -> Result<BuildPlan> {
    let tree = DependencyTree::new(Context::new(options.include_path.clone()));
    create_build_plan(&tree, patterns, options)
}
