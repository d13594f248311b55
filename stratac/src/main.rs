use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use strata::{
    driver::{Artifact, Driver, Options},
    toolchain::SystemToolchain,
};

mod target;

/// Ahead-of-time compiler for the Strata language.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Where to write the executable [default: the input's file stem].
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the generated assembly to stdout instead of building.
    #[arg(short = 'S')]
    emit_asm: bool,

    /// Keep `<output>.s` next to the executable.
    #[arg(short, long)]
    keep: bool,

    /// Trace each compilation phase on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Reject names that don't resolve instead of typing them as `any`.
    #[arg(long)]
    strict: bool,

    #[arg(long, value_enum, default_value_t = target::DEFAULT_TARGET)]
    target: target::Target,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let target = strata::codegen::Target::from(cli.target);
    let options = Options {
        input: cli.input,
        output: cli.output,
        emit_asm: cli.emit_asm,
        keep_asm: cli.keep,
        verbose,
        strict_names: cli.strict,
        target,
    };

    let artifact = match Driver::new(options, SystemToolchain::new(target)).run() {
        Ok(artifact) => artifact,
        Err(error) => {
            eprintln!("error[{}]: {error}", error.phase());
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = report(artifact, verbose) {
        eprintln!("error: {error:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn report(artifact: Artifact, verbose: bool) -> Result<()> {
    match artifact {
        Artifact::Assembly(asm) => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(asm.as_bytes())
                .and_then(|()| stdout.flush())
                .context("failed to write assembly to stdout")?;
        }
        Artifact::Executable(path) => {
            if verbose {
                eprintln!("[stratac] done: {}", path.display());
            }
        }
    }
    Ok(())
}
