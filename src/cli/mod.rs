//! CLI entry point for ticktick-auth.

pub mod auth;

use clap::{Parser, Subcommand};

/// TickTick OAuth helper
#[derive(Parser, Debug)]
#[command(
    name = "ticktick-auth",
    version,
    about = "Log in to the TickTick Open API and manage the cached token"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Use a cached token or run the browser login
    Login,
    /// Show cached tokens and whether the server accepts them
    Status,
    /// Remove cached tokens from the keyring and token file
    Logout,
    /// Print a valid access token for scripting
    Token(TokenArgs),
}

/// Arguments for `ticktick-auth token`.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Print the full `Authorization` header value instead of the bare token
    #[arg(long)]
    pub header: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
