//! Content-addressed artifact cache.
//!
//! A flat directory of generated translation units keyed by transitive
//! fingerprint: entries are named `<fingerprint>-<basename>`. Keys are
//! content-addressed, so concurrent writers can only race on identical
//! bytes and the final publish is an idempotent copy. No GC is defined;
//! touch-on-hit keeps live entries young for external sweepers.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Clone, Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default cache location under the user cache directory.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pyxis")
    }

    fn entry_path(&self, fingerprint: &str, c_file: &Path) -> PathBuf {
        let basename = c_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!("{fingerprint}-{basename}"))
    }

    /// Create the cache directory on demand. Losing a creation race to a
    /// concurrent builder is fine: existence after the error is success.
    fn ensure_dir(&self) -> io::Result<()> {
        match fs::create_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(_) if self.dir.is_dir() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Copy a cached artifact to `c_file` if one exists for `fingerprint`.
    ///
    /// A hit touches the entry's mtime first, then copies. Returns whether
    /// the hit happened.
    pub fn fetch(&self, fingerprint: &str, c_file: &Path) -> io::Result<bool> {
        self.ensure_dir()?;
        let entry = self.entry_path(fingerprint, c_file);
        if !entry.is_file() {
            return Ok(false);
        }
        File::options()
            .append(true)
            .open(&entry)?
            .set_modified(SystemTime::now())?;
        fs::copy(&entry, c_file)?;
        Ok(true)
    }

    /// Publish a freshly generated file under its fingerprint.
    pub fn store(&self, fingerprint: &str, c_file: &Path) -> io::Result<()> {
        self.ensure_dir()?;
        fs::copy(c_file, self.entry_path(fingerprint, c_file))?;
        Ok(())
    }
}
