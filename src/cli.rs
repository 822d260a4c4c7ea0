//! Command-line interface for the tessera sample kernels.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tessera_jit::OptLevel;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Emit, compile and run sample tessera kernels", long_about = None)]
pub struct Cli {
    /// Cranelift optimization level
    #[arg(long, global = true, value_enum, default_value_t = OptArg::Speed)]
    pub opt_level: OptArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the sample kernels
    List,
    /// Print the IR of a kernel
    Ir { kernel: String },
    /// Write a kernel to a relocatable object file
    Compile {
        kernel: String,
        /// Output path (default: `<kernel>.o`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Target triple (default: host)
        #[arg(long)]
        target: Option<String>,
    },
    /// JIT-compile a kernel and run it on sample inputs
    Run { kernel: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OptArg {
    None,
    Speed,
    SpeedAndSize,
}

impl From<OptArg> for OptLevel {
    fn from(arg: OptArg) -> Self {
        match arg {
            OptArg::None => OptLevel::None,
            OptArg::Speed => OptLevel::Speed,
            OptArg::SpeedAndSize => OptLevel::SpeedAndSize,
        }
    }
}
