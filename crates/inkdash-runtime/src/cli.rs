//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "inkdash", about = "e-paper dashboard rotator")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', env = "INKDASH_CONFIG", default_value = "inkdash.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the rotation loop (the default when no subcommand is given)
    Run,
    /// Parse the configuration and print the resolved values, then exit
    CheckConfig,
}
