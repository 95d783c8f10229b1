mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{config, handlers, provider, provider_handlers};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(version)]
#[command(about = "Batched chat notifications and approval requests for unattended agents")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    /// Path to config file (default: <config dir>/nudge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send notifications to the operator's chat
    ///
    /// Several messages given at once are combined into a single chat message.
    /// High priority messages are sent immediately and never combined with later ones.
    ///
    /// Examples:
    ///   nudge notify "Build 1432 finished"
    ///   nudge notify "Tests passed" "Coverage 87%" --priority low
    Notify {
        /// Notification texts
        #[arg(required = true)]
        messages: Vec<String>,

        /// Message priority level (low, normal, high)
        #[arg(short, long, default_value = "normal")]
        priority: String,
    },

    /// Ask the operator a question and wait for the answer
    ///
    /// Every option becomes a button. An "Other" button is always added; choosing
    /// it lets the operator type a free-text answer.
    ///
    /// JSON Response Format (with --json):
    ///   {"selected": "Yes", "custom_text": null, "timed_out": false}
    ///
    /// Examples:
    ///   nudge ask "Deploy build 1432?" -o Yes -o "No:Keep the current release"
    ///   nudge ask "Anything to add?" --timeout 60 --json
    Ask {
        /// The question text
        question: String,

        /// Answer option as LABEL or LABEL:DESCRIPTION (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Header shown above the question
        #[arg(long)]
        header: Option<String>,

        /// Response timeout in seconds, 1 to 86400 (default: approvals.timeout_seconds)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
        timeout: Option<u64>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// Chat provider commands
    Provider {
        #[command(subcommand)]
        command: provider::ProviderCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = handlers::resolve_config_path(cli.config)?;

    match cli.command {
        Commands::Notify { messages, priority } => {
            handlers::handle_notify(&config_path, messages, priority).await?;
        }
        Commands::Ask {
            question,
            options,
            header,
            timeout,
            json,
        } => {
            handlers::handle_ask(&config_path, question, options, header, timeout, json).await?;
        }
        Commands::Config { command } => {
            handlers::handle_config_command(&config_path, command)?;
        }
        Commands::Provider { command } => {
            provider_handlers::handle_provider_commands(&config_path, command).await?;
        }
    }

    Ok(())
}
