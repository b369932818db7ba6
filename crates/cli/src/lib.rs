pub mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use leaveflow_core::Stage;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leaveflow",
    about = "Leaveflow operator CLI",
    long_about = "Operate the absence-request workflow: migrations, readiness, escalation sweeps, and read-only queues.",
    after_help = "Examples:\n  leaveflow doctor --json\n  leaveflow sweep\n  leaveflow pending --stage hr --actor hr-office\n  leaveflow trail --request REQ-0001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organization and payroll calendar")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and the role inheritance graph")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one escalation pass and print the sweep report")]
    Sweep {
        #[arg(long, help = "Evaluate staleness as of this RFC 3339 instant instead of now")]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "List pending requests at a stage that the actor may act on")]
    Pending {
        #[arg(long, value_parser = parse_stage)]
        stage: Stage,
        #[arg(long)]
        actor: String,
    },
    #[command(about = "Count pending requests per stage visible to the actor")]
    Counts {
        #[arg(long)]
        actor: String,
    },
    #[command(about = "Print a request's audit trail and replay it")]
    Trail {
        #[arg(long)]
        request: String,
    },
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    Stage::parse(raw).ok_or_else(|| {
        format!(
            "unknown stage `{raw}` (expected supervisor|manager|general_manager|hr|hr_blue_gray|payroll)"
        )
    })
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
        Command::Sweep { at } => commands::sweep::run(at),
        Command::Pending { stage, actor } => commands::workflow::pending(stage, &actor),
        Command::Counts { actor } => commands::workflow::counts(&actor),
        Command::Trail { request } => commands::workflow::trail(&request),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use leaveflow_core::Stage;

    use super::{Cli, Command};

    #[test]
    fn pending_parses_stage_names() {
        let cli = Cli::try_parse_from([
            "leaveflow",
            "pending",
            "--stage",
            "HR_BLUE_GRAY",
            "--actor",
            "hr-union",
        ])
        .expect("valid arguments");

        match cli.command {
            Command::Pending { stage, actor } => {
                assert_eq!(stage, Stage::HrBlueGray);
                assert_eq!(actor, "hr-union");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let result =
            Cli::try_parse_from(["leaveflow", "pending", "--stage", "ceo", "--actor", "someone"]);
        assert!(result.is_err());
    }

    #[test]
    fn sweep_accepts_an_explicit_instant() {
        let cli = Cli::try_parse_from(["leaveflow", "sweep", "--at", "2026-03-03T09:00:00Z"])
            .expect("valid arguments");
        assert!(matches!(cli.command, Command::Sweep { at: Some(_) }));
    }
}
