// file: src/cli/args.rs
// version: 2.0.0
// guid: 7d3e0b58-a1f6-4c82-9b47-e5c29d06f1a3

//! Command line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blx-provisioner")]
#[command(about = "Provision, configure and run a BLX appliance on a remote Linux host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Structured JSON logs (level from RUST_LOG)
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write a full debug log to a timestamped file in this directory
    #[arg(long, global = true, env = "BLX_PROVISIONER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install, configure and start the appliance
    Setup {
        #[arg(short, long, help = "Desired-state file (YAML, or TOML by extension)")]
        config: PathBuf,
    },

    /// Reconfigure and restart; reinstall when the artifact source changed
    Update {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, help = "Previously applied desired-state file to diff the source against")]
        previous: Option<PathBuf>,

        #[arg(long, conflicts_with = "previous", help = "Reinstall the artifact unconditionally")]
        reinstall: bool,
    },

    /// Stop the appliance (the package stays installed)
    Destroy {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the appliance configuration file that would be written
    Render {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, help = "Include the admin password instead of a placeholder")]
        show_secrets: bool,
    },

    /// Validate a desired-state file without contacting the host
    Validate {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        json: bool,
    },
}
