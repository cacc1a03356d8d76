//! Execution of the work queue against the external compiler.
//!
//! The queue arrives priority-sorted; with `nthreads > 0` a bounded pool
//! of workers drains a FIFO channel, so start order still follows the
//! sort. Work items never depend on each other (generated artifacts are
//! leaves), which keeps the pool trivially deadlock-free.

use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::cache::ArtifactCache;
use crate::error::{BuildError, Result};
use crate::progress::BuildProgress;
use crate::types::{BuildOptions, CompileOptions, WorkItem};

/// Outcome reported by the external compiler for one invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileSummary {
    pub num_errors: usize,
}

/// The downstream single-file compiler capability.
///
/// The driver never interprets the translation itself; it only needs to
/// know whether the unit came out clean. Implementations must be callable
/// from several workers at once.
pub trait Compiler: Sync {
    fn compile(&self, sources: &[PathBuf], options: &CompileOptions) -> io::Result<CompileSummary>;
}

/// Invokes an external compiler executable:
/// `program [--cplus] [-I dir]… -o output source…`.
#[derive(Clone, Debug)]
pub struct CommandCompiler {
    program: String,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, sources: &[PathBuf], options: &CompileOptions) -> io::Result<CompileSummary> {
        let mut command = Command::new(&self.program);
        if options.cplus {
            command.arg("--cplus");
        }
        for dir in &options.include_path {
            command.arg("-I").arg(dir);
        }
        if let Some(output) = &options.output_file {
            command.arg("-o").arg(output);
        }
        command.args(sources);
        let status = command.status()?;
        Ok(CompileSummary {
            num_errors: usize::from(!status.success()),
        })
    }
}

/// Run the work queue to completion.
///
/// The first failing unit aborts the build: remaining queued items are
/// dropped, in-flight items finish their current attempt, and the first
/// observed error surfaces. Already generated files stay on disk.
pub fn compile_all<C: Compiler>(
    compiler: &C,
    work: &[WorkItem],
    options: &BuildOptions,
) -> Result<()> {
    let cache = options.cache.clone().map(ArtifactCache::new);
    let progress = BuildProgress::new(work.len() as u64, options.quiet);

    if options.nthreads == 0 {
        for item in work {
            compile_one(compiler, item, cache.as_ref(), options, &progress)?;
            progress.inc();
        }
        progress.finish();
        return Ok(());
    }

    let (sender, receiver) = crossbeam_channel::unbounded();
    for item in work {
        sender.send(item).expect("queue channel open");
    }
    drop(sender);

    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<BuildError>> = Mutex::new(None);
    thread::scope(|scope| {
        for _ in 0..options.nthreads {
            scope.spawn(|| {
                while let Ok(item) = receiver.recv() {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    match compile_one(compiler, item, cache.as_ref(), options, &progress) {
                        Ok(()) => progress.inc(),
                        Err(err) => {
                            abort.store(true, Ordering::Relaxed);
                            let mut slot = first_error.lock().expect("error slot");
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });
    progress.finish();

    match first_error.into_inner().expect("error slot") {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Compile one unit, consulting and populating the artifact cache.
fn compile_one<C: Compiler>(
    compiler: &C,
    item: &WorkItem,
    cache: Option<&ArtifactCache>,
    options: &BuildOptions,
    progress: &BuildProgress,
) -> Result<()> {
    if let (Some(cache), Some(fingerprint)) = (cache, &item.fingerprint) {
        if cache.fetch(fingerprint, &item.c_file)? {
            progress.println(format!("Found compiled {} in cache", item.source.display()));
            return Ok(());
        }
    }

    progress.println(format!("Cythonizing {}", item.source.display()));
    let compile_options = CompileOptions {
        include_path: options.include_path.clone(),
        cplus: item.cplus,
        output_file: Some(item.c_file.clone()),
    };
    let failed = match compiler.compile(std::slice::from_ref(&item.source), &compile_options) {
        Ok(summary) => summary.num_errors > 0,
        Err(err) => {
            progress.eprintln(err.to_string());
            true
        }
    };
    if failed {
        return Err(BuildError::Compile {
            unit: item.source.clone(),
        });
    }

    if let (Some(cache), Some(fingerprint)) = (cache, &item.fingerprint) {
        cache.store(fingerprint, &item.c_file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Test double: writes a marker translation unit and counts calls.
    struct FakeCompiler {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeCompiler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(
            &self,
            sources: &[PathBuf],
            options: &CompileOptions,
        ) -> io::Result<CompileSummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Ok(CompileSummary { num_errors: 1 });
            }
            let output = options.output_file.clone().expect("output path");
            fs::write(output, format!("/* from {} */\n", sources[0].display()))?;
            Ok(CompileSummary::default())
        }
    }

    fn item(source: PathBuf, c_file: PathBuf, fingerprint: Option<&str>) -> WorkItem {
        WorkItem {
            priority: Priority::Source,
            source,
            c_file,
            fingerprint: fingerprint.map(str::to_string),
            cplus: false,
        }
    }

    fn quiet_options() -> BuildOptions {
        BuildOptions {
            quiet: true,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn serial_run_produces_every_unit() {
        let tmp = TempDir::new().expect("tmp dir");
        let work: Vec<WorkItem> = (0..3)
            .map(|i| {
                let source = tmp.path().join(format!("m{i}.pyx"));
                fs::write(&source, "x = 1\n").expect("write");
                item(source, tmp.path().join(format!("m{i}.c")), None)
            })
            .collect();

        let compiler = FakeCompiler::new();
        compile_all(&compiler, &work, &quiet_options()).expect("build");
        assert_eq!(compiler.calls(), 3);
        for unit in &work {
            assert!(unit.c_file.is_file());
        }
    }

    #[test]
    fn parallel_run_produces_every_unit() {
        let tmp = TempDir::new().expect("tmp dir");
        let work: Vec<WorkItem> = (0..8)
            .map(|i| {
                let source = tmp.path().join(format!("m{i}.pyx"));
                fs::write(&source, "x = 1\n").expect("write");
                item(source, tmp.path().join(format!("m{i}.c")), None)
            })
            .collect();

        let compiler = FakeCompiler::new();
        let options = BuildOptions {
            nthreads: 4,
            ..quiet_options()
        };
        compile_all(&compiler, &work, &options).expect("build");
        assert_eq!(compiler.calls(), 8);
        for unit in &work {
            assert!(unit.c_file.is_file());
        }
    }

    #[test]
    fn compiler_errors_surface_as_compile_failures() {
        let tmp = TempDir::new().expect("tmp dir");
        let source = tmp.path().join("bad.pyx");
        fs::write(&source, "x = 1\n").expect("write");
        let work = vec![item(source.clone(), tmp.path().join("bad.c"), None)];

        let err = compile_all(&FakeCompiler::failing(), &work, &quiet_options()).unwrap_err();
        assert!(matches!(err, BuildError::Compile { unit } if unit == source));
    }

    #[test]
    fn cache_hit_skips_the_compiler() {
        let tmp = TempDir::new().expect("tmp dir");
        let cache_dir = tmp.path().join("cache");
        let source = tmp.path().join("m.pyx");
        fs::write(&source, "x = 1\n").expect("write");
        let c_file = tmp.path().join("m.c");
        let work = vec![item(source, c_file.clone(), Some("feed"))];
        let options = BuildOptions {
            cache: Some(cache_dir),
            ..quiet_options()
        };

        let first = FakeCompiler::new();
        compile_all(&first, &work, &options).expect("build");
        assert_eq!(first.calls(), 1);
        let generated = fs::read(&c_file).expect("read generated");

        fs::remove_file(&c_file).expect("remove");
        let second = FakeCompiler::new();
        compile_all(&second, &work, &options).expect("rebuild");
        assert_eq!(second.calls(), 0);
        assert_eq!(fs::read(&c_file).expect("read cached"), generated);
    }

    #[test]
    fn units_without_fingerprint_bypass_the_cache() {
        let tmp = TempDir::new().expect("tmp dir");
        let source = tmp.path().join("m.pyx");
        fs::write(&source, "x = 1\n").expect("write");
        let work = vec![item(source, tmp.path().join("m.c"), None)];
        let options = BuildOptions {
            cache: Some(tmp.path().join("cache")),
            ..quiet_options()
        };

        let compiler = FakeCompiler::new();
        compile_all(&compiler, &work, &options).expect("build");
        compile_all(&compiler, &work, &options).expect("rebuild");
        assert_eq!(compiler.calls(), 2);
    }
}
