//! Provider subcommands (list, test)

use clap::Subcommand;

#[derive(Subcommand)]
pub enum ProviderCommands {
    /// List configured providers and their status (no secrets)
    List,
    /// Send a test message through the configured provider
    Test {
        /// Text of the test message
        #[arg(long, default_value = "nudge test message")]
        message: String,
    },
}
