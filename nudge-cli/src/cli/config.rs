//! Config subcommands (init, check)

use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration file and report provider status
    Check,
}
