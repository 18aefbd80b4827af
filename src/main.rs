//! `c11frontc` — a thin CLI demonstrator over the [`c11front`] library.
//!
//! This binary is not where the interesting logic lives: command-line
//! entry is an external collaborator's concern (spec.md §1), and this
//! just wires flags onto [`c11front::compile_translation_unit`], prints
//! diagnostics to stderr, and writes the rendered IR to stdout or a file.

use c11front::{CompileError, CompileOptions, TargetArch};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "c11frontc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C11 front end: lex, parse, and lower a translation unit to typed IR", long_about = None)]
struct Cli {
    /// Root translation unit file.
    input: PathBuf,

    /// Target architecture.
    #[arg(long, default_value = "amd64")]
    arch: TargetArch,

    /// User include path, searched before `-isystem` paths (repeatable).
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// System include path, searched after `-I` paths (repeatable).
    #[arg(long = "isystem", value_name = "DIR")]
    isystem: Vec<PathBuf>,

    /// Predefine an object-like macro, `NAME` or `NAME=VALUE` (repeatable).
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Write the rendered IR to this path instead of stdout.
    #[arg(long, value_name = "PATH")]
    emit_ir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut options = CompileOptions::new(cli.arch);
    for dir in cli.include {
        options = options.with_user_include(dir);
    }
    for dir in cli.isystem {
        options = options.with_system_include(dir);
    }
    for def in &cli.define {
        let (name, value) = match def.split_once('=') {
            Some((n, v)) => (n, v),
            None => (def.as_str(), "1"),
        };
        options = options.with_macro(name, value);
    }

    match c11front::compile_translation_unit(&cli.input, &options) {
        Ok(output) => {
            for d in &output.diagnostics {
                eprintln!("{}: warning: {}", output.source_map.display_span(d.primary), d.kind);
            }
            let rendered = output.module.to_string();
            match cli.emit_ir {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, rendered) {
                        eprintln!("c11frontc: cannot write '{}': {e}", path.display());
                        return ExitCode::FAILURE;
                    }
                }
                None => println!("{rendered}"),
            }
            ExitCode::SUCCESS
        }
        Err(CompileError::Io { path, source }) => {
            eprintln!("c11frontc: cannot read '{}': {source}", path.display());
            ExitCode::FAILURE
        }
        Err(err @ CompileError::Diagnostics { .. }) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
