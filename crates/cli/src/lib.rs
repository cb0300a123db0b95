pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "charstats",
    about = "Charstats operator CLI",
    long_about = "Inspect charstats configuration, check document readiness, and look up character sheets.",
    after_help = "Examples:\n  charstats doctor --json\n  charstats config\n  charstats lookup '@alice#0001' --file export.txt"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot token shape, credentials, and document access")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Find a player's stat block in the configured document or a local export")]
    Lookup {
        #[arg(help = "Player identity as written after `Player:`, e.g. @alice#0001")]
        identity: String,
        #[arg(long, help = "Read a plain-text document export instead of fetching")]
        file: Option<PathBuf>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult::text(commands::config::run()),
        Command::Doctor { json } => commands::CommandResult::text(commands::doctor::run(json)),
        Command::Lookup { identity, file, json } => {
            commands::lookup::run(&identity, file.as_deref(), json)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
