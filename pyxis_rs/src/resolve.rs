//! Include-path resolution for textual includes and `.pxd` headers.

use std::path::PathBuf;

/// Ordered include-path search context shared by the dependency tree.
#[derive(Clone, Debug, Default)]
pub struct Context {
    include_path: Vec<PathBuf>,
}

impl Context {
    pub fn new(include_path: Vec<PathBuf>) -> Self {
        Self { include_path }
    }

    /// Locate a textually included file on the include path.
    pub fn find_include_file(&self, name: &str) -> Option<PathBuf> {
        self.include_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Locate the header for a qualified module name: dots become path
    /// separators and `.pxd` is appended.
    pub fn find_pxd_file(&self, qualified_name: &str) -> Option<PathBuf> {
        let relative = PathBuf::from(format!("{}.pxd", qualified_name.replace('.', "/")));
        self.include_path
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pxd_lookup_maps_dots_to_directories() {
        let tmp = tempfile::tempdir().expect("tmp dir");
        let pkg = tmp.path().join("pkg/sub");
        std::fs::create_dir_all(&pkg).expect("mkdir");
        std::fs::write(pkg.join("mod.pxd"), "").expect("write pxd");

        let ctx = Context::new(vec![tmp.path().to_path_buf()]);
        let found = ctx.find_pxd_file("pkg.sub.mod").expect("resolved");
        assert!(found.ends_with("pkg/sub/mod.pxd"));
        assert!(ctx.find_pxd_file("pkg.sub.other").is_none());
    }

    #[test]
    fn include_search_respects_path_order() {
        let tmp = tempfile::tempdir().expect("tmp dir");
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        std::fs::create_dir_all(&first).expect("mkdir");
        std::fs::create_dir_all(&second).expect("mkdir");
        std::fs::write(first.join("shared.pxi"), "# a").expect("write");
        std::fs::write(second.join("shared.pxi"), "# b").expect("write");

        let ctx = Context::new(vec![first.clone(), second]);
        let found = ctx.find_include_file("shared.pxi").expect("resolved");
        assert_eq!(found, first.join("shared.pxi"));
    }
}
