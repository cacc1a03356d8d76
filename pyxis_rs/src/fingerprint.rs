//! Content fingerprints for the artifact cache.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Extensions of downstream-generated artifacts.
///
/// Files with these extensions never contribute to a transitive
/// fingerprint: a fingerprint covering its own outputs would change on
/// every build and make incremental rebuilds non-idempotent.
pub const GENERATED_EXTENSIONS: &[&str] = &["c", "cpp", "h"];

/// True when `path` names a downstream-generated artifact.
pub fn is_generated(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| GENERATED_EXTENSIONS.contains(&ext))
}

/// Hash of one file's identity and contents: length-prefixed path bytes,
/// then the raw contents. Stable across runs and platforms.
pub fn file_hash(path: &Path) -> io::Result<String> {
    let contents = fs::read(path)?;
    let path_text = path.to_string_lossy();
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:", path_text.len()));
    hasher.update(path_text.as_bytes());
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn generated_set_covers_c_cpp_h() {
        assert!(is_generated(Path::new("mod.c")));
        assert!(is_generated(Path::new("mod.cpp")));
        assert!(is_generated(Path::new("vendor/fast.h")));
        assert!(!is_generated(Path::new("mod.pyx")));
        assert!(!is_generated(Path::new("mod.pxd")));
        assert!(!is_generated(Path::new("Makefile")));
    }

    #[test]
    fn hash_is_deterministic() {
        let tmp = tempfile::tempdir().expect("tmp dir");
        let file = tmp.path().join("mod.pyx");
        std::fs::write(&file, "cimport numpy\n").expect("write");
        assert_eq!(
            file_hash(&file).expect("hash"),
            file_hash(&file).expect("hash")
        );
    }

    #[test]
    fn hash_covers_contents_and_path() {
        let tmp = tempfile::tempdir().expect("tmp dir");
        let a = tmp.path().join("a.pyx");
        let b = tmp.path().join("b.pyx");
        std::fs::write(&a, "x = 1\n").expect("write");
        std::fs::write(&b, "x = 1\n").expect("write");
        // Same bytes, different identity.
        assert_ne!(file_hash(&a).expect("hash"), file_hash(&b).expect("hash"));

        std::fs::write(&a, "x = 2\n").expect("write");
        let before = file_hash(&b).expect("hash");
        std::fs::write(&b, "x = 2\n").expect("write");
        assert_ne!(before, file_hash(&b).expect("hash"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(file_hash(&PathBuf::from("/nonexistent/mod.pyx")).is_err());
    }
}
