//! Core types shared across the driver.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::settings::{Aliases, BuildSettings};

/// An extension-module descriptor.
///
/// Carries the module name, its source files, and the recognised build
/// settings ferried to the downstream toolchain. The driver reads and
/// rewrites descriptors but never interprets the settings beyond
/// `language`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionModule {
    /// Fully qualified module name. In a template descriptor it may
    /// contain `*`, resolved per matched file.
    pub name: String,
    /// Source files; the first decides driver eligibility.
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub settings: BuildSettings,
}

impl ExtensionModule {
    pub fn new(name: impl Into<String>, sources: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            sources,
            settings: BuildSettings::new(),
        }
    }

    /// Target language of this module, when set.
    pub fn language(&self) -> Option<&str> {
        self.settings.language()
    }
}

/// A build pattern: a glob over source files, or a full descriptor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    Glob(String),
    Module(ExtensionModule),
}

impl From<&str> for Pattern {
    fn from(glob: &str) -> Self {
        Pattern::Glob(glob.to_string())
    }
}

impl From<String> for Pattern {
    fn from(glob: String) -> Self {
        Pattern::Glob(glob)
    }
}

impl From<ExtensionModule> for Pattern {
    fn from(module: ExtensionModule) -> Self {
        Pattern::Module(module)
    }
}

/// Why a unit recompiles; doubles as its scheduling priority. The queue is
/// sorted ascending, so freshly edited sources compile first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// The source itself changed.
    Source,
    /// A direct dependency changed.
    Direct,
    /// A transitive (non-direct) dependency changed.
    Transitive,
}

/// One scheduled compilation.
#[derive(Clone, Debug, Serialize)]
pub struct WorkItem {
    pub priority: Priority,
    pub source: PathBuf,
    /// The generated translation unit to produce.
    pub c_file: PathBuf,
    /// Cache key. Absent under `force`, without a configured cache, or
    /// when fingerprinting hit an I/O error.
    pub fingerprint: Option<String>,
    /// Generate C++ instead of C.
    pub cplus: bool,
}

/// Driver options.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Worker count for the executor; `0` compiles serially.
    pub nthreads: usize,
    /// Suppress informational console output.
    pub quiet: bool,
    /// Recompile everything; also disables fingerprinting.
    pub force: bool,
    /// Alias substitutions applied to build settings.
    pub aliases: Option<Aliases>,
    /// Glob patterns excluded from expansion.
    pub exclude: Vec<String>,
    /// Artifact cache directory; `None` disables caching.
    pub cache: Option<PathBuf>,
    /// Force the C++ back-end for every unit.
    pub cplus: bool,
    /// Search path for textual includes and `.pxd` headers.
    pub include_path: Vec<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            nthreads: 0,
            quiet: false,
            force: false,
            aliases: None,
            exclude: Vec::new(),
            cache: None,
            cplus: false,
            include_path: vec![PathBuf::from(".")],
        }
    }
}

/// Options handed to the external compiler for one unit.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    pub include_path: Vec<PathBuf>,
    pub cplus: bool,
    pub output_file: Option<PathBuf>,
}
