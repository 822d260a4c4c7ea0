//! tessera CLI entry point.

mod cli;

use std::str::FromStr;

use clap::Parser;
use cli::{Cli, Command};
use target_lexicon::Triple;
use tessera::kernels::{self, KERNELS, Kernel};
use tessera::{Module, ModuleResult};
use tessera_jit::OptLevel;
use tracing_subscriber::EnvFilter;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TESSERA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(e) = tessera_jit::init_native_target() {
        // Object emission for an explicit target still works.
        tracing::warn!("{e}");
    }
    let opt_level = OptLevel::from(cli.opt_level);

    match cli.command {
        Command::List => {
            for k in KERNELS {
                println!("{:<12} {}", k.name, k.description);
            }
        }
        Command::Ir { kernel } => {
            let module = or_exit(build(&kernel, opt_level));
            print!("{}", module.ir());
        }
        Command::Compile {
            kernel,
            output,
            target,
        } => {
            let triple = target.map(|t| match Triple::from_str(&t) {
                Ok(triple) => triple,
                Err(e) => {
                    eprintln!("Invalid target `{t}`: {e}");
                    std::process::exit(1);
                }
            });
            let module = or_exit(build(&kernel, opt_level));
            let bytes = or_exit(module.emit_object(triple));
            let path = output.unwrap_or_else(|| format!("{kernel}.o").into());
            if let Err(e) = std::fs::write(&path, &bytes) {
                eprintln!("Error writing {}: {e}", path.display());
                std::process::exit(1);
            }
            println!("wrote {} ({} bytes)", path.display(), bytes.len());
        }
        Command::Run { kernel } => {
            let k = find(&kernel);
            let mut module = or_exit(build(&kernel, opt_level));
            or_exit(module.compile());
            println!("{}", or_exit(k.run(&module)));
        }
    }
}

fn find(name: &str) -> &'static Kernel {
    kernels::find(name).unwrap_or_else(|| {
        eprintln!("Unknown kernel `{name}` (try `tessera list`)");
        std::process::exit(1);
    })
}

fn build(name: &str, opt_level: OptLevel) -> ModuleResult<Module> {
    let mut module = Module::with_opt_level(opt_level);
    find(name).emit(&mut module)?;
    Ok(module)
}

fn or_exit<T>(result: ModuleResult<T>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}
