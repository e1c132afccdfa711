//! Command-line surface: `wavec <input> [-o <output>] [--raw]`.

use std::path::PathBuf;

use clap::Parser;

/// Wave language compiler. Translates source text straight into an x86-64
/// ELF executable with no intermediate representation and no linker.
#[derive(Parser, Debug, Clone)]
#[command(name = "wavec", version, about, long_about = None)]
pub struct Cli {
    /// Wave source file to compile.
    pub input: PathBuf,

    /// Output path. May be given more than once; the last occurrence wins.
    #[arg(
        short = 'o',
        long = "output",
        default_value = "a.out",
        overrides_with = "output"
    )]
    pub output: PathBuf,

    /// Write only the raw code-buffer bytes instead of an ELF executable.
    #[arg(long)]
    pub raw: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
