//! Config command - print the resolved decoder configuration

use anyhow::{Context, Result};
use capture_decode::config;
use clap::Args;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Ignore decode.toml and layer settings, print the defaults
    #[arg(long)]
    pub defaults: bool,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let resolved = if args.defaults {
        capture_decode::DecodeConfig::default()
    } else {
        config::resolve()
    };

    match config::config_dir() {
        Some(dir) => println!("# config dir: {}", dir.display()),
        None => println!("# config dir: unavailable"),
    }
    let text = toml::to_string_pretty(&resolved).context("Failed to serialize config")?;
    print!("{text}");

    Ok(())
}
