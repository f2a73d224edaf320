use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Pearl environment setup")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Use the development data directory (./.operate)
    #[arg(long, global = true)]
    pub dev: bool,

    /// Sub‑commands (setup, status, etc.)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install missing dependencies (default if no sub‑command)
    Setup {
        /// Emit progress events as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },
    /// Show which dependencies are present
    Status,
    /// Create or upgrade the middleware environment
    Provision {
        /// Where to copy the `operate` CLI (defaults to the data directory)
        #[arg(long)]
        entrypoint_dir: Option<PathBuf>,
    },
    /// Force-reinstall the pinned middleware package
    Reinstall,
    /// Print resolved data directory paths
    Paths,
    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Write the default configuration file
    Init,
}
