//! relprov - release provisioner
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use relprov::cli::{Cli, Commands};
use relprov::config::schema::LogFormat;
use relprov::config::ConfigManager;
use relprov::error::RelprovResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RelprovResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("relprov=warn"),
        1 => EnvFilter::new("relprov=info"),
        _ => EnvFilter::new("relprov=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match config.general.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.without_time().init(),
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Compile(args) => relprov::cli::commands::compile(args, &config).await,
        Commands::Find(args) => relprov::cli::commands::find(args, &config).await,
        Commands::Agent(args) => relprov::cli::commands::agent(args, &config).await,
        Commands::Config(args) => {
            relprov::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
