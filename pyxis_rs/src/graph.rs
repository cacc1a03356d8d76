//! Memoised dependency graph over module sources.
//!
//! [`DependencyTree`] answers per-file queries (direct includes, cimported
//! headers, the transitive closure, merged build settings) and caches every
//! answer per `(operation, path)`. The graph is a directed multigraph and
//! may contain cycles (modules that mutually cimport each other's headers
//! are legal), so the transitive fold carries explicit cycle bookkeeping
//! instead of trusting the recursion to terminate.
//!
//! Planning is single-threaded, hence the `RefCell` caches; the tree is
//! built and fully consulted before the parallel executor starts.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::error::{BuildError, Result};
use crate::extract::{SourceDependencies, parse_dependencies};
use crate::fingerprint::{self, is_generated};
use crate::resolve::Context;
use crate::settings::{Aliases, BuildSettings};

/// Cimports under this namespace are compiler builtins, not files.
const BUILTIN_PREFIX: &str = "cython.";

/// Canonical form used for every path stored as a cache key.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// The memoised dependency graph for one build.
///
/// Build one per driver run (tests may hold several independent trees);
/// all caches die with it.
pub struct DependencyTree {
    context: Context,
    parsed: RefCell<HashMap<PathBuf, Rc<SourceDependencies>>>,
    included: RefCell<HashMap<PathBuf, BTreeSet<PathBuf>>>,
    cimports_externs: RefCell<HashMap<PathBuf, Rc<(BTreeSet<String>, BTreeSet<String>)>>>,
    packages: RefCell<HashMap<PathBuf, Rc<Vec<String>>>>,
    pxd_lookup: RefCell<HashMap<(String, Option<PathBuf>), Option<PathBuf>>>,
    cimported: RefCell<HashMap<PathBuf, Rc<Vec<PathBuf>>>>,
    immediate: RefCell<HashMap<PathBuf, BTreeSet<PathBuf>>>,
    closure: RefCell<HashMap<PathBuf, BTreeSet<PathBuf>>>,
    merged_settings: RefCell<HashMap<PathBuf, BuildSettings>>,
    timestamps: RefCell<HashMap<PathBuf, SystemTime>>,
    hashes: RefCell<HashMap<PathBuf, String>>,
}

impl DependencyTree {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            parsed: RefCell::default(),
            included: RefCell::default(),
            cimports_externs: RefCell::default(),
            packages: RefCell::default(),
            pxd_lookup: RefCell::default(),
            cimported: RefCell::default(),
            immediate: RefCell::default(),
            closure: RefCell::default(),
            merged_settings: RefCell::default(),
            timestamps: RefCell::default(),
            hashes: RefCell::default(),
        }
    }

    /// Parsed dependencies of one file, read at most once per tree.
    pub fn parse(&self, path: &Path) -> Result<Rc<SourceDependencies>> {
        if let Some(hit) = self.parsed.borrow().get(path) {
            return Ok(Rc::clone(hit));
        }
        let parsed = Rc::new(parse_dependencies(path)?);
        self.parsed
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Textual includes of `path`, resolved first relative to its own
    /// directory, then on the include path. Unresolved includes are
    /// reported and skipped; the build proceeds without the edge.
    pub fn included_files(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        if let Some(hit) = self.included.borrow().get(path) {
            return Ok(hit.clone());
        }
        let parsed = self.parse(path)?;
        let mut resolved = BTreeSet::new();
        for include in &parsed.includes {
            let sibling = path.parent().map(|dir| dir.join(include));
            let candidate = match sibling {
                Some(local) if local.is_file() => Some(local),
                _ => self.context.find_include_file(include),
            };
            match candidate {
                Some(found) => {
                    resolved.insert(normalize(&found));
                }
                None => println!(
                    "Unable to locate '{include}' referenced from '{}'",
                    path.display()
                ),
            }
        }
        self.included
            .borrow_mut()
            .insert(path.to_path_buf(), resolved.clone());
        Ok(resolved)
    }

    /// Cimports and extern headers of `path`, folded across its textual
    /// include closure. Inclusion is transitive: an included file's own
    /// includes contribute, and include cycles terminate.
    pub fn cimports_and_externs(
        &self,
        path: &Path,
    ) -> Result<Rc<(BTreeSet<String>, BTreeSet<String>)>> {
        if let Some(hit) = self.cimports_externs.borrow().get(path) {
            return Ok(Rc::clone(hit));
        }
        let mut cimports = BTreeSet::new();
        let mut externs = BTreeSet::new();
        let mut seen = BTreeSet::from([path.to_path_buf()]);
        let mut queue = vec![path.to_path_buf()];
        while let Some(current) = queue.pop() {
            let parsed = self.parse(&current)?;
            cimports.extend(parsed.cimports.iter().cloned());
            externs.extend(parsed.externs.iter().cloned());
            for include in self.included_files(&current)? {
                if seen.insert(include.clone()) {
                    queue.push(include);
                }
            }
        }
        let result = Rc::new((cimports, externs));
        self.cimports_externs
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&result));
        Ok(result)
    }

    /// Module names cimported by `path` (including through includes).
    pub fn cimports(&self, path: &Path) -> Result<BTreeSet<String>> {
        Ok(self.cimports_and_externs(path)?.0.clone())
    }

    /// Enclosing package path, outermost first: every ancestor directory
    /// carrying an `__init__.py` marker.
    pub fn package(&self, path: &Path) -> Rc<Vec<String>> {
        if let Some(hit) = self.packages.borrow().get(path) {
            return Rc::clone(hit);
        }
        let result = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && dir.join("__init__.py").is_file() => {
                let mut chain = (*self.package(dir)).clone();
                if let Some(name) = dir.file_name() {
                    chain.push(name.to_string_lossy().into_owned());
                }
                Rc::new(chain)
            }
            _ => Rc::new(Vec::new()),
        };
        self.packages
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&result));
        result
    }

    /// Package path plus the file stem, dot-joined.
    pub fn fully_qualified_name(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut parts = (*self.package(path)).clone();
        parts.push(stem);
        parts.join(".")
    }

    /// Resolve a cimported module to its header file.
    ///
    /// With a referring file, the module is first looked up inside that
    /// file's package; the global include path decides otherwise. Leading
    /// dots (explicit relative cimports) are not supported.
    pub fn find_pxd(&self, module: &str, from_file: Option<&Path>) -> Result<Option<PathBuf>> {
        if module.starts_with('.') {
            return Err(BuildError::RelativeCimport(module.to_string()));
        }
        let key = (module.to_string(), from_file.map(Path::to_path_buf));
        if let Some(hit) = self.pxd_lookup.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let mut found = None;
        if let Some(from) = from_file {
            let mut qualified = (*self.package(from)).clone();
            qualified.extend(module.split('.').map(str::to_string));
            found = self.context.find_pxd_file(&qualified.join("."));
        }
        if found.is_none() {
            found = self.context.find_pxd_file(module);
        }
        let found = found.map(|pxd| normalize(&pxd));
        self.pxd_lookup.borrow_mut().insert(key, found.clone());
        Ok(found)
    }

    /// Header files `path` depends on through cimports.
    ///
    /// A `.pyx` source pulls in its sibling `.pxd` automatically. Builtin
    /// cimports resolve inside the compiler and are skipped. An unresolved
    /// cimport is reported but non-fatal.
    pub fn cimported_files(&self, path: &Path) -> Result<Rc<Vec<PathBuf>>> {
        if let Some(hit) = self.cimported.borrow().get(path) {
            return Ok(Rc::clone(hit));
        }
        let mut headers = Vec::new();
        if path.extension().is_some_and(|ext| ext == "pyx") {
            let sibling = path.with_extension("pxd");
            if sibling.is_file() {
                headers.push(normalize(&sibling));
            }
        }
        for module in self.cimports(path)? {
            if module == "cython" || module.starts_with(BUILTIN_PREFIX) {
                continue;
            }
            match self.find_pxd(&module, Some(path))? {
                Some(pxd) => headers.push(pxd),
                None => {
                    println!("missing cimport: {}", path.display());
                    println!("{module}");
                }
            }
        }
        let headers = Rc::new(headers);
        self.cimported
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&headers));
        Ok(headers)
    }

    /// The file itself, its cimported headers, and its direct includes.
    pub fn immediate_dependencies(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        if let Some(hit) = self.immediate.borrow().get(path) {
            return Ok(hit.clone());
        }
        let mut all = BTreeSet::from([path.to_path_buf()]);
        all.extend(self.cimported_files(path)?.iter().cloned());
        all.extend(self.included_files(path)?);
        self.immediate
            .borrow_mut()
            .insert(path.to_path_buf(), all.clone());
        Ok(all)
    }

    /// Transitive closure of [`Self::immediate_dependencies`] along
    /// cimport edges. Cycle-tolerant; idempotent per tree.
    pub fn all_dependencies(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        let mut stack = HashMap::new();
        let (closure, _) = self.transitive_merge(
            path,
            &self.closure,
            &|tree, node| tree.immediate_dependencies(node),
            &|mut acc: BTreeSet<PathBuf>, sub| {
                acc.extend(sub.iter().cloned());
                acc
            },
            &mut stack,
        )?;
        Ok(closure)
    }

    /// Build settings for `path` merged across the cimport closure, with
    /// aliases applied and an optional template base merged underneath.
    pub fn distutils_info(
        &self,
        path: &Path,
        aliases: Option<&Aliases>,
        base: Option<&BuildSettings>,
    ) -> Result<BuildSettings> {
        let mut stack = HashMap::new();
        let (merged, _) = self.transitive_merge(
            path,
            &self.merged_settings,
            &|tree, node| tree.parse(node).map(|parsed| parsed.settings.clone()),
            &|acc: BuildSettings, sub| acc.merged(sub),
            &mut stack,
        )?;
        let mut resolved = merged.subs(aliases);
        if let Some(base) = base {
            resolved = resolved.merged(base);
        }
        Ok(resolved)
    }

    /// Generic cycle-tolerant fold along cimport edges.
    ///
    /// Each node's extracted value is merged with the folded values of its
    /// descendants. A descendant already on the call stack returns its own
    /// extracted value and reports a back-edge to that ancestor; a node
    /// finalises into `cache` only once no back-edge points above it, so
    /// memoisation stays correct inside strongly connected components.
    fn transitive_merge<T, E, M>(
        &self,
        node: &Path,
        cache: &RefCell<HashMap<PathBuf, T>>,
        extract: &E,
        merge: &M,
        stack: &mut HashMap<PathBuf, usize>,
    ) -> Result<(T, Option<PathBuf>)>
    where
        T: Clone,
        E: Fn(&Self, &Path) -> Result<T>,
        M: Fn(T, &T) -> T,
    {
        if let Some(hit) = cache.borrow().get(node) {
            return Ok((hit.clone(), None));
        }
        let mut value = extract(self, node)?;
        if stack.contains_key(node) {
            return Ok((value, Some(node.to_path_buf())));
        }
        stack.insert(node.to_path_buf(), stack.len());
        let mut back_edge: Option<PathBuf> = None;
        let outgoing = self.cimported_files(node)?;
        for next in outgoing.iter() {
            let (sub_value, sub_loop) = self.transitive_merge(next, cache, extract, merge, stack)?;
            if let Some(sub_loop) = sub_loop {
                // Keep whichever back-edge points at the shallower ancestor.
                let keep_current = back_edge
                    .as_ref()
                    .is_some_and(|current| stack[current] < stack[&sub_loop]);
                if !keep_current {
                    back_edge = Some(sub_loop);
                }
            }
            value = merge(value, &sub_value);
        }
        stack.remove(node);
        if back_edge.as_deref() == Some(node) {
            back_edge = None;
        }
        if back_edge.is_none() {
            cache.borrow_mut().insert(node.to_path_buf(), value.clone());
        }
        Ok((value, back_edge))
    }

    /// Modification time, memoised per path.
    pub fn timestamp(&self, path: &Path) -> Result<SystemTime> {
        if let Some(hit) = self.timestamps.borrow().get(path) {
            return Ok(*hit);
        }
        let mtime = fs::metadata(path)?.modified()?;
        self.timestamps.borrow_mut().insert(path.to_path_buf(), mtime);
        Ok(mtime)
    }

    /// The newest file in the dependency closure, ties broken by path.
    pub fn newest_dependency(&self, path: &Path) -> Result<(SystemTime, PathBuf)> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for dep in self.all_dependencies(path)? {
            let mtime = self.timestamp(&dep)?;
            let newer = newest
                .as_ref()
                .is_none_or(|(best_mtime, best)| (mtime, &dep) > (*best_mtime, best));
            if newer {
                newest = Some((mtime, dep));
            }
        }
        Ok(newest.expect("closure always contains the file itself"))
    }

    /// Content hash of one file, memoised per path.
    pub fn file_hash(&self, path: &Path) -> std::io::Result<String> {
        if let Some(hit) = self.hashes.borrow().get(path) {
            return Ok(hit.clone());
        }
        let digest = fingerprint::file_hash(path)?;
        self.hashes
            .borrow_mut()
            .insert(path.to_path_buf(), digest.clone());
        Ok(digest)
    }

    /// Deterministic fingerprint of `path` plus every non-generated file
    /// in its dependency closure, prefixed with the driver version and
    /// optionally salted with an extra tag (e.g. the target language).
    ///
    /// Any I/O trouble yields `Ok(None)`: the unit simply is not cached
    /// this build. Other errors propagate.
    pub fn transitive_fingerprint(
        &self,
        path: &Path,
        extra: Option<&str>,
    ) -> Result<Option<String>> {
        let closure = match self.all_dependencies(path) {
            Ok(closure) => closure,
            Err(BuildError::Io(_)) => return Ok(None),
            Err(other) => return Err(other),
        };
        let mut hasher = Sha256::new();
        hasher.update(crate::DRIVER_VERSION);
        match self.file_hash(path) {
            Ok(digest) => hasher.update(digest),
            Err(_) => return Ok(None),
        }
        for dep in &closure {
            if is_generated(dep) {
                continue;
            }
            match self.file_hash(dep) {
                Ok(digest) => hasher.update(digest),
                Err(_) => return Ok(None),
            }
        }
        if let Some(extra) = extra {
            hasher.update(extra);
        }
        Ok(Some(format!("{:x}", hasher.finalize())))
    }
}
