//! ticktick-auth CLI binary entry point.

use clap::Parser;
use ticktick_auth::cli::{Cli, Commands};
use ticktick_auth::config::AuthConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match AuthConfig::from_env() {
        Ok(config) => match cli.command {
            Commands::Login => ticktick_auth::cli::auth::handle_login(config).await,
            Commands::Status => ticktick_auth::cli::auth::handle_status(config).await,
            Commands::Logout => ticktick_auth::cli::auth::handle_logout(config).await,
            Commands::Token(args) => {
                ticktick_auth::cli::auth::handle_token(config, args.header).await
            }
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
