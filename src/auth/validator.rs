use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;

use super::token::TokenRecord;
use crate::config::AuthConfig;

/// Decides whether a token can still be handed to callers.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &TokenRecord) -> bool;
}

/// Local expiry check followed by one authenticated GET against a cheap endpoint.
///
/// Any transport error, timeout, or non-200 status counts as invalid. Results
/// are not memoized.
#[derive(Debug, Clone)]
pub struct ProbeValidator {
    http: reqwest::Client,
    probe_url: String,
    timeout: Duration,
}

impl ProbeValidator {
    pub fn new(http: reqwest::Client, probe_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            probe_url: probe_url.into(),
            timeout,
        }
    }

    pub fn from_config(http: reqwest::Client, config: &AuthConfig) -> Self {
        Self::new(http, config.endpoints.probe_url(), config.probe_timeout)
    }
}

#[async_trait]
impl TokenValidator for ProbeValidator {
    async fn validate(&self, token: &TokenRecord) -> bool {
        if token.is_absent() {
            tracing::debug!("Rejecting empty access token");
            return false;
        }
        if token.is_expired_at(Utc::now()) {
            tracing::debug!(expires_at = %token.expires_at, "Rejecting expired token");
            return false;
        }

        let response = self
            .http
            .get(&self.probe_url)
            .bearer_auth(&token.access_token)
            .timeout(self.timeout)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status() == StatusCode::OK => true,
            Ok(resp) => {
                tracing::debug!(status = resp.status().as_u16(), "Token probe rejected token");
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, "Token probe failed");
                false
            }
        }
    }
}
