mod config;
mod control;
mod dispatcher;
mod logging;
mod messages;
mod paths;
mod process;
mod process_monitor;
mod session;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::config::{Catalog, Config, ConfigError};
use crate::messages::Messages;
use crate::process::SystemProcesses;
use crate::session::{Orchestrator, Phase, SessionSettings};

/// Exit code for a session cut short by Ctrl+C.
const INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "game-session", version, about = "Prepares the desktop for a game and restores it afterwards")]
struct Cli {
    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Localized messages file
    #[arg(long, global = true)]
    messages: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one session for a configured game, returning when the game exits
    Run {
        /// Game id from the config file
        game: String,
    },
    /// Validate the config file and list what is usable
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(&paths::log_dir());

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.unwrap_or_else(paths::config_file_path);
    let (catalog, issues) = Config::load(&config_path)?.validate();
    for issue in &issues {
        warn!("[config] {issue}");
    }

    match cli.command {
        Commands::Check => Ok(check(&catalog, &issues)),
        Commands::Run { game } => {
            let messages_path = cli.messages.unwrap_or_else(paths::messages_file_path);
            run_session(catalog, &game, &messages_path).await
        }
    }
}

fn check(catalog: &Catalog, issues: &[ConfigError]) -> ExitCode {
    for game in catalog.games.values() {
        info!(
            "[config] Game '{}' ({}) matches '{}' with {} integration(s)",
            game.id,
            game.display_name,
            game.process,
            game.integrations.len()
        );
    }
    for integration in catalog.integrations.values() {
        info!(
            "[config] Integration '{}': {} / {}",
            integration.id, integration.start_action, integration.stop_action
        );
    }
    if issues.is_empty() {
        info!("[config] No issues found");
        ExitCode::SUCCESS
    } else {
        warn!("[config] {} issue(s) found", issues.len());
        ExitCode::FAILURE
    }
}

async fn run_session(mut catalog: Catalog, game_id: &str, messages_path: &std::path::Path) -> Result<ExitCode> {
    let game = catalog
        .games
        .remove(game_id)
        .with_context(|| format!("Unknown game '{game_id}'"))?;

    let loaded = Messages::load_or_empty(messages_path).unwrap_or_else(|e| {
        warn!("[messages] {e:#}; using built-in messages");
        Messages::empty()
    });
    let messages = Messages::defaults().merged_with(loaded);

    let status_path = catalog
        .global
        .status_file
        .clone()
        .unwrap_or_else(paths::status_file_path);
    let settings = SessionSettings::from(&catalog.global);
    let mut orchestrator =
        Orchestrator::new(SystemProcesses::new(), settings, messages).with_status_file(status_path);

    let state = tokio::select! {
        state = orchestrator.run(game, &mut catalog.integrations) => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; integrations were not restored");
            return Ok(ExitCode::from(INTERRUPTED));
        }
    };

    if state.phase == Phase::Terminated {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
