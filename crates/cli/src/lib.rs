pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Relay operator CLI",
    long_about = "Operate relay migrations, retention cleanup, and runtime readiness checks.",
    after_help = "Examples:\n  relay migrate\n  relay cleanup --retention-days 7\n  relay doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Garbage-collect the idempotency ledger and expired run records per retention windows"
    )]
    Cleanup {
        #[arg(long, help = "Override the processed-event retention window in days")]
        retention_days: Option<u32>,
    },
    #[command(about = "Validate config, encryption key readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Cleanup { retention_days } => commands::cleanup::run(retention_days),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
