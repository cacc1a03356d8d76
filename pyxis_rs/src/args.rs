//! Command-line argument parsing for the `pyxis` binary.

use std::path::PathBuf;

use crate::cache::ArtifactCache;
use crate::settings::{AliasValue, Aliases};
use crate::types::BuildOptions;

#[derive(Clone, Debug)]
pub struct ParsedArgs {
    pub patterns: Vec<String>,
    pub exclude: Vec<String>,
    pub nthreads: usize,
    pub quiet: bool,
    pub force: bool,
    pub cache: Option<PathBuf>,
    pub cplus: bool,
    pub include_path: Vec<PathBuf>,
    pub aliases: Aliases,
    pub compiler: String,
    pub list: bool,
    pub json: bool,
    pub show_help: bool,
    pub show_version: bool,
}

impl Default for ParsedArgs {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            exclude: Vec::new(),
            nthreads: 0,
            quiet: false,
            force: false,
            cache: None,
            cplus: false,
            include_path: Vec::new(),
            aliases: Aliases::new(),
            compiler: "cython".to_string(),
            list: false,
            json: false,
            show_help: false,
            show_version: false,
        }
    }
}

impl ParsedArgs {
    /// Driver options derived from the parsed flags.
    pub fn build_options(&self) -> BuildOptions {
        let include_path = if self.include_path.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.include_path.clone()
        };
        BuildOptions {
            nthreads: self.nthreads,
            quiet: self.quiet,
            force: self.force,
            aliases: (!self.aliases.is_empty()).then(|| self.aliases.clone()),
            exclude: self.exclude.clone(),
            cache: self.cache.clone(),
            cplus: self.cplus,
            include_path,
        }
    }
}

pub fn usage() -> &'static str {
    "pyxis - incremental build driver for Cython extension modules\n\n\
Usage: pyxis [options] <pattern>...\n\n\
Patterns are globs over module sources; `**` matches zero or more\n\
directories (quote them so the shell does not expand first).\n\n\
Options:\n  \
  -j, --parallel <N>        Compile with N workers (default: serial)\n  \
  -q, --quiet               Suppress informational output\n  \
      --force               Recompile everything, ignore timestamps\n  \
      --exclude <glob>      Skip matching files (repeatable)\n  \
      --cache[=DIR]         Reuse generated files from a fingerprint cache\n                            \
(default DIR: the user cache directory)\n  \
      --cplus               Generate C++ for every unit\n  \
  -I, --include-dir <dir>   Add a directory to the include path (repeatable)\n  \
      --alias <KEY=V[,V]>   Substitute KEY in list-valued settings (repeatable)\n  \
      --compiler <prog>     External compiler executable (default: cython)\n  \
      --list                Print the work queue and exit without compiling\n  \
      --json                With --list, emit the queue as JSON\n  \
  -h, --help                Show this help\n  \
  -V, --version             Show version"
}

/// Parse command-line arguments. Errors carry a user-facing message and
/// the caller prints the usage text.
pub fn parse_args(argv: &[String]) -> Result<ParsedArgs, String> {
    let mut parsed = ParsedArgs::default();
    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.show_help = true,
            "-V" | "--version" => parsed.show_version = true,
            "-q" | "--quiet" => parsed.quiet = true,
            "--force" => parsed.force = true,
            "--cplus" => parsed.cplus = true,
            "--list" => parsed.list = true,
            "--json" => parsed.json = true,
            "-j" | "--parallel" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--parallel expects a worker count".to_string())?;
                parsed.nthreads = parse_workers(value)?;
            }
            _ if arg.starts_with("--parallel=") => {
                parsed.nthreads = parse_workers(arg.trim_start_matches("--parallel="))?;
            }
            "--exclude" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--exclude expects a glob".to_string())?;
                parsed.exclude.push(value.clone());
            }
            _ if arg.starts_with("--exclude=") => {
                parsed
                    .exclude
                    .push(arg.trim_start_matches("--exclude=").to_string());
            }
            "--cache" => parsed.cache = Some(ArtifactCache::default_dir()),
            _ if arg.starts_with("--cache=") => {
                parsed.cache = Some(PathBuf::from(arg.trim_start_matches("--cache=")));
            }
            "-I" | "--include-dir" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--include-dir expects a directory".to_string())?;
                parsed.include_path.push(PathBuf::from(value));
            }
            _ if arg.starts_with("--include-dir=") => {
                parsed
                    .include_path
                    .push(PathBuf::from(arg.trim_start_matches("--include-dir=")));
            }
            "--alias" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--alias expects KEY=VALUE".to_string())?;
                insert_alias(&mut parsed.aliases, value)?;
            }
            _ if arg.starts_with("--alias=") => {
                insert_alias(&mut parsed.aliases, arg.trim_start_matches("--alias="))?;
            }
            "--compiler" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--compiler expects an executable".to_string())?;
                parsed.compiler = value.clone();
            }
            _ if arg.starts_with("--compiler=") => {
                parsed.compiler = arg.trim_start_matches("--compiler=").to_string();
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("unknown option: {arg}"));
            }
            _ => parsed.patterns.push(arg.clone()),
        }
    }
    Ok(parsed)
}

fn parse_workers(value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| "--parallel expects a non-negative integer".to_string())
}

fn insert_alias(aliases: &mut Aliases, spec: &str) -> Result<(), String> {
    let (key, value) = spec
        .split_once('=')
        .ok_or_else(|| format!("--alias expects KEY=VALUE, got '{spec}'"))?;
    let alias = if value.contains(',') {
        AliasValue::Many(
            value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        )
    } else {
        AliasValue::One(value.trim().to_string())
    };
    aliases.insert(key.trim().to_string(), alias);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn bare_arguments_are_patterns() {
        let parsed = parse_args(&argv(&["src/*.pyx", "lib/**/*.pyx"])).expect("parse");
        assert_eq!(parsed.patterns, vec!["src/*.pyx", "lib/**/*.pyx"]);
    }

    #[test]
    fn flags_round_trip_into_build_options() {
        let parsed = parse_args(&argv(&[
            "-j",
            "4",
            "--force",
            "-q",
            "--exclude",
            "skip/*.pyx",
            "--cache=/tmp/c",
            "--cplus",
            "-I",
            "vendor",
            "src/*.pyx",
        ]))
        .expect("parse");
        let options = parsed.build_options();
        assert_eq!(options.nthreads, 4);
        assert!(options.force);
        assert!(options.quiet);
        assert_eq!(options.exclude, vec!["skip/*.pyx"]);
        assert_eq!(options.cache, Some(PathBuf::from("/tmp/c")));
        assert!(options.cplus);
        assert_eq!(options.include_path, vec![PathBuf::from("vendor")]);
    }

    #[test]
    fn include_path_defaults_to_cwd() {
        let parsed = parse_args(&argv(&["src/*.pyx"])).expect("parse");
        assert_eq!(
            parsed.build_options().include_path,
            vec![PathBuf::from(".")]
        );
    }

    #[test]
    fn aliases_split_on_commas() {
        let parsed = parse_args(&argv(&[
            "--alias",
            "NUMPY=/np/core,/np/extra",
            "--alias=LANG=c++",
        ]))
        .expect("parse");
        assert_eq!(
            parsed.aliases.get("NUMPY"),
            Some(&AliasValue::Many(vec![
                "/np/core".to_string(),
                "/np/extra".to_string()
            ]))
        );
        assert_eq!(
            parsed.aliases.get("LANG"),
            Some(&AliasValue::One("c++".to_string()))
        );
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(parse_args(&argv(&["--warp-drive"])).is_err());
    }

    #[test]
    fn missing_values_are_rejected() {
        assert!(parse_args(&argv(&["--parallel"])).is_err());
        assert!(parse_args(&argv(&["--alias", "NOEQUALS"])).is_err());
    }

    #[test]
    fn bare_cache_flag_uses_the_default_directory() {
        let parsed = parse_args(&argv(&["--cache", "src/*.pyx"])).expect("parse");
        assert_eq!(parsed.cache, Some(ArtifactCache::default_dir()));
        assert_eq!(parsed.patterns, vec!["src/*.pyx"]);
    }
}
