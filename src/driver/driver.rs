//! Compilation driver: file I/O around the compiler core, output selection,
//! and the statistical report.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::backend::elf;
use crate::frontend::Compiler;

use super::cli::Cli;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot open {path}: {source}")]
    ReadInput {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    WriteOutput {
        path: String,
        source: std::io::Error,
    },
}

/// Compile `cli.input` and write the result to `cli.output`.
pub fn run(cli: &Cli) -> Result<(), DriverError> {
    let source = fs::read(&cli.input).map_err(|e| DriverError::ReadInput {
        path: cli.input.display().to_string(),
        source: e,
    })?;
    info!(input = %cli.input.display(), bytes = source.len(), "compiling");

    let mut compiler = Compiler::new(source);
    compiler.compile();

    write_output(&compiler, &cli.output, cli.raw)?;
    info!(
        output = %cli.output.display(),
        code_bytes = compiler.code().len(),
        raw = cli.raw,
        "wrote output"
    );
    print_report(&compiler, &cli.output, cli.raw);
    Ok(())
}

/// Write either the ELF executable or, with `--raw`, the bare code bytes.
pub fn write_output(compiler: &Compiler, output: &Path, raw: bool) -> Result<(), DriverError> {
    let result = if raw {
        elf::write_raw(output, compiler.code())
    } else {
        elf::write_executable(
            output,
            compiler.code(),
            compiler.data(),
            compiler.global_bytes(),
        )
    };
    result.map_err(|e| DriverError::WriteOutput {
        path: output.display().to_string(),
        source: e,
    })
}

/// The statistical report quoted at the end of every successful run.
fn print_report(compiler: &Compiler, output: &Path, raw: bool) {
    if raw {
        println!(
            "Generated raw: {} ({} bytes)",
            output.display(),
            compiler.code().len()
        );
    } else {
        println!("Generated: {}", output.display());
        println!("   Code: {} bytes", compiler.code().len());
    }
    println!(
        "   Variables: {} | Functions: {}",
        compiler.var_count(),
        compiler.func_count()
    );
    let uf = compiler.unified();
    println!("   Unified: i={:.2} e={:.2} r={:.2}", uf.i, uf.e, uf.r);
    println!(
        "   Tile: {} bytes ({} pools)",
        compiler.tile().total_used(),
        compiler.tile().pool_count()
    );
    println!("   Fate: {}", compiler.fate().mode());
    println!(
        "   Platform: id={} syscall_base=0x{:x}",
        compiler.platform().id,
        compiler.platform().syscall_base
    );
}
