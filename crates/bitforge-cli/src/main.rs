//! BitForge IR dumper.
//!
//! Compiles a query through the full pipeline (parse, optimize, codegen,
//! target-aware LLVM passes) and prints the optimized IR to stdout without
//! executing anything. Parse and compile errors go to stderr with exit
//! code 1.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bitforge::{CompilerOptions, ExecutionContext};

#[derive(Parser)]
#[command(name = "bitforge-ir")]
#[command(about = "Print the optimized LLVM IR for a BitForge query", long_about = None)]
#[command(version)]
struct Cli {
    /// Query expression, e.g. '(a & b) | !c'
    query: String,

    /// Symbol name for the generated functions
    #[arg(short, long, default_value = "query")]
    name: String,

    /// Optimization level (0-3)
    #[arg(short = 'O', long, default_value_t = 3)]
    opt_level: u8,

    /// 64-bit lanes per loop iteration (power of two, max 64)
    #[arg(long, default_value_t = 8)]
    vector_width: u32,

    /// Override host CPU detection with an LLVM CPU name
    #[arg(long)]
    cpu: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut options = CompilerOptions::new()
        .with_optimization_level(cli.opt_level)
        .with_vector_width(cli.vector_width);
    if let Some(cpu) = cli.cpu {
        options = options.with_cpu(cpu);
    }

    let context = ExecutionContext::with_options(options)?;
    let ir = context.compile_ir(&cli.name, &cli.query)?;
    println!("{ir}");
    Ok(())
}
