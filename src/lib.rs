//! ticktick-auth: OAuth2 login for the TickTick Open API
//!
//! Runs the browser-based authorization-code grant through a one-shot local
//! callback listener and keeps the resulting token in a layered cache
//! (OS keyring, then a JSON file, then an environment variable) so later runs
//! stay silent.
//!
//! # Quick Start
//!
//! ```no_run
//! use ticktick_auth::client::ApiClient;
//! use ticktick_auth::config::AuthConfig;
//!
//! # async fn example() -> ticktick_auth::error::Result<()> {
//! let client = ApiClient::connect(AuthConfig::from_env()?).await?;
//! let projects = client.get("/open/v1/project")?.send().await?;
//! println!("{}", projects.status());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
