pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "collaborator",
    about = "Collaborator operator CLI",
    long_about = "Operate the Collaborator Teams bot: migrations, readiness checks, config inspection, conversation history and feedback.",
    after_help = "Examples:\n  collaborator doctor --json\n  collaborator config\n  collaborator clear-conversation 19:abc@thread.v2\n  collaborator feedback-summary"
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
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM and Teams credentials, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Delete the stored history of one conversation")]
    ClearConversation {
        #[arg(help = "Teams conversation id, e.g. 19:abc@thread.v2")]
        conversation_id: String,
    },
    #[command(about = "Report like and dislike counts across all recorded feedback")]
    FeedbackSummary,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::ClearConversation { conversation_id } => {
            commands::clear_conversation::run(&conversation_id)
        }
        Command::FeedbackSummary => commands::feedback_summary::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
