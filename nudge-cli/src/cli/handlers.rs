//! Command handlers

use anyhow::{bail, Context, Result};
use nudge_core::approval::{ApprovalCoordinator, ApprovalSettings};
use nudge_core::batcher::{BatcherSettings, FlushOutcome, MessageBatcher};
use nudge_core::gateway::{GatewayClient, TelegramTransport};
use nudge_core::models::{ApprovalOption, ApprovalOutcome, Configuration, Priority, TELEGRAM_TOKEN_ENV};
use nudge_core::services::logging::init_logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::config::ConfigCommands;

/// Exit code for an approval that timed out.
const EXIT_TIMED_OUT: i32 = 2;

pub fn resolve_config_path(config: Option<PathBuf>) -> Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => Configuration::default_config_path().context("Could not locate config file"),
    }
}

/// Load and validate the configuration, then start logging at its level.
pub fn load_config(path: &Path) -> Result<Configuration> {
    let config = Configuration::load_validated(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    // Already initialized when called twice in one process.
    let _ = init_logging(config.log_level);
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Telegram gateway for the configured chat. The token comes from the environment only.
pub fn build_client(config: &Configuration) -> Result<Arc<GatewayClient<TelegramTransport>>> {
    let telegram = &config.providers.telegram;
    if !telegram.enabled {
        bail!("Telegram is not enabled in config (providers.telegram.enabled)");
    }
    let chat_id = telegram
        .chat_id
        .clone()
        .filter(|c| !c.trim().is_empty())
        .context("Chat ID not configured for Telegram")?;
    let token = Configuration::telegram_token()
        .with_context(|| format!("{} not set", TELEGRAM_TOKEN_ENV))?;

    let transport = Arc::new(TelegramTransport::new(token, chat_id));
    let client = GatewayClient::from_config(transport, config)?;
    Ok(Arc::new(client))
}

/// Parse `LABEL` or `LABEL:DESCRIPTION`.
pub fn parse_option(raw: &str) -> Result<ApprovalOption> {
    let (label, description) = match raw.split_once(':') {
        Some((label, description)) => (label.trim(), Some(description.trim())),
        None => (raw.trim(), None),
    };
    if label.is_empty() {
        bail!("Option label cannot be empty: '{}'", raw);
    }
    let option = ApprovalOption::new(label);
    Ok(match description.filter(|d| !d.is_empty()) {
        Some(description) => option.with_description(description),
        None => option,
    })
}

pub async fn handle_notify(config_path: &Path, messages: Vec<String>, priority: String) -> Result<()> {
    let config = load_config(config_path)?;
    let priority: Priority = priority.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let client = build_client(&config)?;
    let batcher = MessageBatcher::new(client, BatcherSettings::from_config(&config.batching))?;

    let mut outcomes = Vec::new();
    for message in messages {
        if let Some(outcome) = batcher.add(message, priority).await {
            outcomes.push(outcome);
        }
    }
    outcomes.extend(batcher.shutdown().await);

    let failed: Vec<&FlushOutcome> = outcomes.iter().filter(|o| !o.delivered).collect();
    for outcome in &outcomes {
        if outcome.delivered {
            println!(
                "Sent {} message(s) as chat message {}",
                outcome.message_count,
                outcome.handle.as_ref().map(|h| h.as_str()).unwrap_or("?")
            );
        }
    }
    if !failed.is_empty() {
        for outcome in &failed {
            eprintln!("Undelivered:\n{}", outcome.combined);
        }
        bail!("{} batch(es) could not be delivered", failed.len());
    }
    Ok(())
}

pub async fn handle_ask(
    config_path: &Path,
    question: String,
    options: Vec<String>,
    header: Option<String>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let options = options
        .iter()
        .map(|raw| parse_option(raw))
        .collect::<Result<Vec<_>>>()?;
    let config = load_config(config_path)?;
    let client = build_client(&config)?;
    let coordinator = Arc::new(ApprovalCoordinator::new(
        client.clone(),
        ApprovalSettings::from_config(&config.approvals),
    )?);
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(coordinator.settings().default_timeout);

    client.start_polling().await;
    let interrupted = Arc::clone(&coordinator);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; giving up on the answer");
            interrupted.shutdown();
        }
    });

    let result = coordinator
        .ask(&question, &options, header.as_deref(), timeout)
        .await;
    interrupt.abort();
    client.stop_polling().await;
    let outcome = result.context("Approval request failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    } else {
        match &outcome {
            ApprovalOutcome::Answered {
                selected,
                custom_text: Some(text),
            } => println!("{}: {}", selected, text),
            ApprovalOutcome::Answered { selected, .. } => println!("{}", selected),
            ApprovalOutcome::TimedOut => eprintln!("No answer within {}s", timeout.as_secs()),
        }
    }

    if outcome.is_timed_out() {
        std::process::exit(EXIT_TIMED_OUT);
    }
    Ok(())
}

pub fn handle_config_command(config_path: &Path, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            Configuration::default().save_to_file(config_path)?;
            println!("Configuration written to {}", config_path.display());
            println!(
                "Enable providers.telegram, set its chat_id and export {} to start sending.",
                TELEGRAM_TOKEN_ENV
            );
            Ok(())
        }
        ConfigCommands::Check => {
            let config = load_config(config_path)?;
            println!("Configuration OK: {}", config_path.display());
            println!(
                "rate_limit: {}/min, burst {}",
                config.rate_limit.max_per_minute, config.rate_limit.burst_size
            );
            println!(
                "batching: {}s window, flush above {} queued",
                config.batching.window_seconds, config.batching.max_queue_size
            );
            println!("approvals: {}s default timeout", config.approvals.timeout_seconds);
            println!(
                "telegram: {}",
                super::provider_handlers::telegram_status(&config)
            );
            Ok(())
        }
    }
}
