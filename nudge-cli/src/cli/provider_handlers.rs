//! Handler for provider list and provider test

use anyhow::Result;
use nudge_core::gateway::ChatGateway;
use nudge_core::models::{Configuration, Priority};
use std::path::Path;

use super::handlers::{build_client, load_config};
use super::provider::ProviderCommands;

/// Status for provider list (no secrets)
pub fn telegram_status(config: &Configuration) -> &'static str {
    if !config.providers.telegram.enabled {
        return "disabled";
    }
    let chat_ok = config
        .providers
        .telegram
        .chat_id
        .as_ref()
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    let token_set = Configuration::telegram_token().is_some();
    match (token_set, chat_ok) {
        (true, true) => "configured",
        (false, _) => "missing_token",
        (_, false) => "missing_chat_id",
    }
}

pub async fn handle_provider_commands(config_path: &Path, command: ProviderCommands) -> Result<()> {
    match command {
        ProviderCommands::List => handle_provider_list(config_path),
        ProviderCommands::Test { message } => handle_provider_test(config_path, &message).await,
    }
}

fn handle_provider_list(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    println!("provider\tenabled\tstatus");
    println!(
        "telegram\t{}\t{}",
        config.providers.telegram.enabled,
        telegram_status(&config)
    );
    Ok(())
}

async fn handle_provider_test(config_path: &Path, message: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let client = build_client(&config)?;
    let handle = client
        .send(message, Priority::Normal)
        .await
        .map_err(|e| anyhow::anyhow!("Send failed: {}", e))?;
    println!("Test message sent to Telegram (message {})", handle);
    Ok(())
}
