// file: src/main.rs
// version: 2.0.0
// guid: 41e7b9d2-6a05-4c38-8f1e-a2d5c07b93e6

//! BLX Provisioner - Main entry point

use blx_provisioner::{
    cli::{
        args::{Cli, Commands},
        commands::*,
    },
    logging::logger,
};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger()?;
    } else if let Some(dir) = &cli.log_dir {
        let path = logger::init_file_logger(dir, cli.verbose, cli.quiet)?;
        info!("Writing debug log to {}", path.display());
    } else {
        logger::init_logger(cli.verbose, cli.quiet)?;
    }

    // Ctrl+C abandons the in-flight step; nothing is rolled back
    let shutdown_signal = async {
        match signal::ctrl_c().await {
            Ok(()) => warn!("Received Ctrl+C, abandoning the current operation"),
            Err(e) => {
                warn!("Unable to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let command_future = async {
        match &cli.command {
            Commands::Setup { config } => setup_command(config).await,
            Commands::Update {
                config,
                previous,
                reinstall,
            } => update_command(config, previous.as_deref(), *reinstall).await,
            Commands::Destroy { config } => destroy_command(config).await,
            Commands::Render {
                config,
                show_secrets,
            } => render_command(config, *show_secrets).await,
            Commands::Validate { config, json } => validate_command(config, *json).await,
        }
    };

    tokio::select! {
        result = command_future => result,
        _ = shutdown_signal => {
            warn!("Interrupted; the appliance may be partially configured");
            std::process::exit(130);
        }
    }
}
