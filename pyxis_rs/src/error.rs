//! Error types for the build driver.
//!
//! Unresolved includes and cimports are deliberately absent here: those are
//! console warnings and the build proceeds without the missing edge.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced by planning or execution.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A `distutils:` directive used a key outside the recognised set.
    #[error("unknown distutils setting '{0}'")]
    UnknownSetting(String),

    /// A `distutils:` directive line had no `key = value` shape.
    #[error("malformed distutils directive '{0}'")]
    MalformedDirective(String),

    /// Leading-dot cimport syntax.
    #[error("relative cimport '{0}' is not implemented")]
    RelativeCimport(String),

    /// The downstream compiler reported errors for a translation unit.
    #[error("compilation failed for {}", unit.display())]
    Compile { unit: PathBuf },

    /// A user-supplied glob pattern failed to parse.
    #[error("invalid glob pattern")]
    Glob(#[from] globset::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;
