use std::path::PathBuf;

use clap::{Parser, Subcommand};
use voca_config::SessionConfig;

/// Command-line tools for the Voca voice-room relay.
#[derive(Parser, Debug)]
#[command(name = "voca", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error, or a full directive).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a room and print how to join it.
    CreateRoom(ServerArgs),

    /// Check a room password against the password rule.
    CheckPassword { password: String },

    /// Print the signaling URL for a room.
    SocketUrl {
        room: String,

        #[command(flatten)]
        server: ServerArgs,
    },
}

/// Connection settings that override the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Server URL (https://, http://, wss:// or ws://).
    #[arg(long)]
    pub server: Option<String>,

    /// API key sent to the server.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Room password (4-12 letters or digits).
    #[arg(long)]
    pub password: Option<String>,
}

impl ServerArgs {
    pub fn apply(&self, config: &mut SessionConfig) {
        if let Some(server) = &self.server {
            config.server_url = Some(server.clone());
        }
        if let Some(key) = &self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
