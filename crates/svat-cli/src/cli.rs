//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};

use crate::commands::api::ApiCommand;
use crate::commands::auth::AuthCommand;
use crate::commands::chat::ChatArgs;

/// Client for the svat vulnerability analysis service.
#[derive(Parser, Debug)]
#[command(name = "svat")]
#[command(author, version = env!("SVAT_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub target: Target,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the service lives.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// REST API base URL
    #[arg(
        long,
        env = "SVAT_API_URL",
        default_value = "http://localhost:8000",
        global = true
    )]
    pub api_url: String,

    /// WebSocket base URL for chat channels
    #[arg(
        long,
        env = "SVAT_WS_URL",
        default_value = "ws://localhost:8000/ws",
        global = true
    )]
    pub ws_url: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Account and session management
    Auth(AuthCommand),

    /// Authenticated REST operations
    Api(ApiCommand),

    /// Chat with an analysed collection
    Chat(ChatArgs),
}
