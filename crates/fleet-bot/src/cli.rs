use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "fleetbot",
    about = "Discord bot that restarts game servers once they are empty or an approver agrees",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "FLEETBOT_CONFIG",
        default_value = "fleetbot.yaml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to Discord and serve commands
    Run {
        /// Discord bot token
        #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
        token: String,

        /// Overrides minecraft.rcon_password from the configuration
        #[arg(long, env = "MC_RCON_PASSWORD", hide_env_values = true)]
        rcon_password: Option<String>,
    },

    /// Validate the configuration and list the commands it enables
    Check,
}
