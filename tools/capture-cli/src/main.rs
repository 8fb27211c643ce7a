//! capdump - inspect captured graphics API call streams
//!
//! # Commands
//!
//! - `capdump info <trace>` - Print the file header and wire format
//! - `capdump calls <trace>` - List call entries in capture order
//! - `capdump scan <trace>` - Frame every call and check its payload
//! - `capdump config` - Print the resolved decoder configuration
//!
//! Set `RUST_LOG` or pass `-v` for more output.

mod calls;
mod config;
mod info;
mod scan;
mod trace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// capdump - inspect captured graphics API call streams
#[derive(Parser)]
#[command(name = "capdump")]
#[command(about = "Inspect captured graphics API call streams")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the file header and wire format
    Info(info::InfoArgs),

    /// List call entries in capture order
    Calls(calls::CallsArgs),

    /// Frame every call and check its payload
    Scan(scan::ScanArgs),

    /// Print the resolved decoder configuration
    Config(config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info(args) => info::execute(args),
        Commands::Calls(args) => calls::execute(args),
        Commands::Scan(args) => scan::execute(args),
        Commands::Config(args) => config::execute(args),
    }
}
