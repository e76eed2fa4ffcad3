//! CLI handlers for login, status, logout, and token.

use chrono::Utc;

use crate::auth::{Authenticator, TokenSource};
use crate::config::AuthConfig;

/// Handle `ticktick-auth login`.
pub async fn handle_login(config: AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut authenticator = Authenticator::new(config);
    let authenticated = authenticator.authenticate().await?;

    match authenticated.source {
        TokenSource::Cached { backend } => {
            println!("✅ Already logged in (token from {backend})");
        }
        TokenSource::Exchanged {
            persisted_to: Some(backend),
        } => {
            println!("✅ Login successful, token saved to {backend}");
        }
        TokenSource::Exchanged { persisted_to: None } => {
            println!("✅ Login successful");
            println!("⚠️  Token could not be saved, the next run will open the browser again");
        }
    }
    println!(
        "   Expires: {}",
        authenticated.token.expires_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Handle `ticktick-auth status`.
pub async fn handle_status(config: AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator = Authenticator::new(config);

    println!("🔐 Authentication Status\n");

    let candidates = authenticator.status().await;
    if candidates.is_empty() {
        println!("  ❌ No cached token");
    }
    let now = Utc::now();
    for candidate in candidates {
        let expires = candidate.token.expires_at.format("%Y-%m-%d %H:%M");
        let status = if candidate.valid {
            format!("✅ Valid (expires {expires})")
        } else if candidate.token.is_expired_at(now) {
            format!("⚠️  Expired ({expires})")
        } else {
            "❌ Rejected by server".to_string()
        };
        println!("  {}: {status}", candidate.backend);
    }

    Ok(())
}

/// Handle `ticktick-auth logout`.
pub async fn handle_logout(config: AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator = Authenticator::new(config);
    authenticator.logout()?;
    println!("✅ Logged out");
    Ok(())
}

/// Handle `ticktick-auth token`.
pub async fn handle_token(
    config: AuthConfig,
    header: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut authenticator = Authenticator::new(config);
    let token = authenticator.authenticate().await?.token;
    if header {
        println!("{}", token.bearer_header());
    } else {
        println!("{}", token.access_token);
    }
    Ok(())
}
