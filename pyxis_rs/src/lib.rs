//! # pyxis
//!
//! Incremental build driver for Cython extension modules. Plan once,
//! compile only what changed.
//!
//! The driver scans `.pyx`/`.py` sources for their cimports, textual
//! includes and extern headers with cheap lexical extraction (no real
//! front-end run), folds them into a cycle-tolerant dependency graph,
//! fingerprints each unit across its non-generated closure, and hands the
//! stale units to a downstream single-file compiler, in parallel, with a
//! content-addressed artifact cache in between.
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use pyxis::{BuildOptions, CommandCompiler, Pattern, cythonize};
//!
//! let patterns = vec![Pattern::from("src/**/*.pyx")];
//! let options = BuildOptions {
//!     nthreads: 4,
//!     ..BuildOptions::default()
//! };
//! let compiler = CommandCompiler::new("cython");
//! let modules = cythonize(&patterns, &options, &compiler)?;
//! # Ok::<(), pyxis::BuildError>(())
//! ```
//!
//! ## CLI usage
//!
//! ```bash
//! pyxis 'src/**/*.pyx'             # compile what changed
//! pyxis -j 8 --cache ~/.c 'src/**/*.pyx'
//! pyxis --list 'src/**/*.pyx'      # show the plan, compile nothing
//! ```

pub mod args;
pub mod cache;
pub mod driver;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fingerprint;
pub mod glob;
pub mod graph;
pub mod literals;
pub mod planner;
pub mod progress;
pub mod resolve;
pub mod settings;
pub mod types;

pub use driver::{cythonize, plan_build};
pub use error::{BuildError, Result};
pub use executor::{CommandCompiler, CompileSummary, Compiler};
pub use types::{BuildOptions, ExtensionModule, Pattern, Priority, WorkItem};

/// Version token mixed into every transitive fingerprint, so artifacts
/// generated by one driver version never satisfy another.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
