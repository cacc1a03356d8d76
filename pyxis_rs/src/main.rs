use std::env;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;

use pyxis::args::{ParsedArgs, parse_args, usage};
use pyxis::progress;
use pyxis::{CommandCompiler, Pattern, cythonize, plan_build};

fn main() -> ExitCode {
    let argv: Vec<String> = env::args().skip(1).collect();
    let parsed = match parse_args(&argv) {
        Ok(parsed) => parsed,
        Err(message) => {
            progress::error(&message);
            eprintln!("\n{}", usage());
            return ExitCode::from(2);
        }
    };

    if parsed.show_help {
        println!("{}", usage());
        return ExitCode::SUCCESS;
    }
    if parsed.show_version {
        println!("pyxis {}", pyxis::DRIVER_VERSION);
        return ExitCode::SUCCESS;
    }
    if parsed.patterns.is_empty() {
        progress::error("no build patterns given");
        eprintln!("\n{}", usage());
        return ExitCode::from(2);
    }

    match run(&parsed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            progress::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(parsed: &ParsedArgs) -> anyhow::Result<()> {
    let options = parsed.build_options();
    let patterns: Vec<Pattern> = parsed
        .patterns
        .iter()
        .map(|pattern| Pattern::from(pattern.clone()))
        .collect();

    if parsed.list {
        let plan = plan_build(&patterns, &options).context("planning failed")?;
        if parsed.json {
            println!("{}", serde_json::to_string_pretty(&plan.work)?);
        } else {
            for item in &plan.work {
                println!(
                    "{:?}\t{} -> {}",
                    item.priority,
                    item.source.display(),
                    item.c_file.display()
                );
            }
            if !options.quiet {
                progress::success(&format!("{} unit(s) would compile", plan.work.len()));
            }
        }
        return Ok(());
    }

    let started = Instant::now();
    let compiler = CommandCompiler::new(parsed.compiler.clone());
    let modules = cythonize(&patterns, &options, &compiler).context("build failed")?;
    if !options.quiet {
        progress::success(&format!(
            "{} module(s) up to date in {}",
            modules.len(),
            progress::format_duration(started.elapsed())
        ));
    }
    Ok(())
}
