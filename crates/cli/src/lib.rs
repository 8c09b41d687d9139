pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leadline",
    about = "Leadline operator CLI",
    long_about = "Operate Leadline: apply migrations, seed demo data, inspect configuration, run readiness checks and drive maintenance passes.",
    after_help = "Examples:\n  leadline doctor --json\n  leadline config\n  leadline sweep --limit 50"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo workspace, members, scenarios and leads")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, messaging and LLM readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Run one maintenance pass: SLA breaches, escalations, dispatch and reply expiry"
    )]
    Sweep {
        #[arg(long, help = "Maximum number of queued messages to dispatch in this pass")]
        limit: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sweep { limit } => commands::sweep::run(limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
