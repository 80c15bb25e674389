use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use dzkeeper::commands::{self, run::RunMode};
use dzkeeper::config::{Config, ValidationResult, resolve_config_path};
use dzkeeper::{logging, ui};

#[derive(Parser)]
#[command(name = "dzkeeper")]
#[command(about = "Unattended DayZ server keeper with a Discord kill feed")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (default: $DZKEEPER_CONFIG or dzkeeper.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kill feed, and the server when auto_start is set
    Run {
        /// Start and supervise the server regardless of server.auto_start
        #[arg(long)]
        start_server: bool,
    },
    /// Supervise the server process only
    Server,
    /// Run the kill feed only
    Killfeed,
    /// Regenerate the mod list from the mods directory
    Genmods,
    /// Learn player identities from every existing log file
    Ingest,
    /// Validate the configuration and print derived settings
    Check,
}

fn load_config(path: Option<&std::path::Path>) -> Result<(Config, ValidationResult)> {
    let path = resolve_config_path(path);
    let config = Config::load_from(&path)?;
    let validation = config.validate()?;
    Ok((config, validation))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, validation) = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            ui::print_error_box_with_hints(
                "Configuration Error",
                Some(&format!("{e:#}")),
                &[
                    "Pass the file explicitly with --config <path>",
                    "[server] and [killfeed] sections are required",
                ],
            );
            return ExitCode::FAILURE;
        },
    };

    let command = cli.command.unwrap_or(Commands::Run {
        start_server: false,
    });

    if matches!(command, Commands::Check) {
        return report(commands::check::execute(&config, &validation), false);
    }

    logging::init_tracing(&config.logging);
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let result = match command {
        Commands::Run { start_server } => {
            let mode = RunMode::all(&config, start_server);
            commands::run::execute(config, mode).await
        },
        Commands::Server => commands::run::execute(config, RunMode::SERVER_ONLY).await,
        Commands::Killfeed => commands::run::execute(config, RunMode::KILLFEED_ONLY).await,
        Commands::Genmods => commands::genmods::execute(&config),
        Commands::Ingest => commands::ingest::execute(&config),
        Commands::Check => Ok(()),
    };
    report(result, true)
}

fn report(result: Result<()>, traced: bool) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if traced => {
            error!(error = %format!("{e:#}"), "dzkeeper failed");
            ExitCode::FAILURE
        },
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}
