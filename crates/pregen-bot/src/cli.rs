//! CLI parser.

use clap::{Parser, Subcommand};
use pregen_core::Mode;

#[derive(Parser)]
#[command(name = "pregen")]
#[command(about = "Discord bot that pregenerates static interaction responses", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: pregen.toml).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Without a subcommand the mode comes from PREGEN_ENV.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Rebuild output on every change and stay connected.
    Dev,
    /// Pregenerate, register commands and exit.
    Build,
    /// Serve previously built output.
    Start,
}

impl Commands {
    pub fn mode(self) -> Mode {
        match self {
            Commands::Dev => Mode::Development,
            Commands::Build => Mode::Build,
            Commands::Start => Mode::Production,
        }
    }
}
