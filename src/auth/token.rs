use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Lifetime assumed for a token injected through the environment.
pub const RAW_TOKEN_LIFETIME_SECS: i64 = 86_400;
const RAW_TOKEN_SCOPE: &str = "tasks:read tasks:write";
const BEARER: &str = "bearer";

/// An issued bearer token plus its expiry bookkeeping.
///
/// The absolute expiry is computed once when the token is issued and never
/// recomputed. It has whole-second resolution, matching the persisted format.
/// Records are either fully populated or not constructed at all.
///
/// # Example
/// ```no_run
/// use chrono::Utc;
/// use ticktick_auth::auth::TokenRecord;
///
/// let token = TokenRecord::from_raw_access_token("abc123", Utc::now());
/// assert!(!token.is_expired_at(Utc::now()));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// Relative lifetime reported by the server at issuance.
    pub expires_in: i64,
    /// Absolute expiry, persisted as Unix seconds.
    #[serde(rename = "expires_time", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &redact(&self.access_token))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenRecord {
    /// Build a record from a token endpoint response, fixing the absolute expiry at `now`.
    pub fn issue(response: TokenResponse, now: DateTime<Utc>) -> Result<Self, AuthError> {
        if response.access_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }
        let expires_at = expiry_after(now, response.expires_in)?;
        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            scope: response.scope,
            expires_in: response.expires_in,
            expires_at,
        })
    }

    /// Wrap a manually supplied access token with an assumed 24 hour lifetime.
    pub fn from_raw_access_token(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            access_token: token.into(),
            token_type: BEARER.to_string(),
            scope: RAW_TOKEN_SCOPE.to_string(),
            expires_in: RAW_TOKEN_LIFETIME_SECS,
            expires_at: now.trunc_subsecs(0) + TimeDelta::seconds(RAW_TOKEN_LIFETIME_SECS),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Tokens remain valid through their expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, `None` once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now).to_std().ok()
    }

    /// Value for an `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// JSON body returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

fn expiry_after(now: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, AuthError> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| now.trunc_subsecs(0).checked_add_signed(delta))
        .ok_or_else(|| AuthError::InvalidResponse(format!("expires_in out of range: {secs}")))
}

fn redact(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn response(token: &str, expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: token.to_string(),
            token_type: "bearer".to_string(),
            expires_in,
            scope: "tasks:read tasks:write".to_string(),
        }
    }

    #[test]
    fn issue_fixes_absolute_expiry() {
        let token = TokenRecord::issue(response("abc", 3600), fixed_now()).unwrap();
        assert_eq!(token.expires_at, fixed_now() + TimeDelta::seconds(3600));
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn issue_rejects_empty_access_token() {
        let err = TokenRecord::issue(response("", 3600), fixed_now()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[test]
    fn issue_rejects_out_of_range_lifetime() {
        let err = TokenRecord::issue(response("abc", i64::MAX), fixed_now()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[test]
    fn valid_through_expiry_instant() {
        let token = TokenRecord::issue(response("abc", 60), fixed_now()).unwrap();
        let at_expiry = fixed_now() + TimeDelta::seconds(60);
        assert!(!token.is_expired_at(at_expiry));
        assert!(token.is_expired_at(at_expiry + TimeDelta::seconds(1)));
    }

    #[test]
    fn raw_token_gets_a_day() {
        let token = TokenRecord::from_raw_access_token("raw", fixed_now());
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.scope, "tasks:read tasks:write");
        assert_eq!(
            token.remaining(fixed_now()),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn remaining_is_none_after_expiry() {
        let token = TokenRecord::from_raw_access_token("raw", fixed_now());
        assert_eq!(token.remaining(fixed_now() + TimeDelta::days(2)), None);
    }

    #[test]
    fn serializes_expiry_as_unix_seconds() {
        let token = TokenRecord::issue(response("abc", 60), fixed_now()).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(
            json["expires_time"],
            serde_json::json!(fixed_now().timestamp() + 60)
        );
        let back: TokenRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn issued_expiry_survives_persistence_unchanged() {
        let now = fixed_now() + TimeDelta::nanoseconds(5_871_911);
        let token = TokenRecord::issue(response("abc", 3600), now).unwrap();
        assert_eq!(token.expires_at, fixed_now() + TimeDelta::seconds(3600));

        let json = serde_json::to_string(&token).unwrap();
        let back: TokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn raw_token_expiry_has_whole_seconds() {
        let now = fixed_now() + TimeDelta::milliseconds(750);
        let token = TokenRecord::from_raw_access_token("raw", now);
        assert_eq!(token.expires_at, fixed_now() + TimeDelta::days(1));
    }

    #[test]
    fn response_defaults_missing_fields() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":10}"#).unwrap();
        assert_eq!(parsed.token_type, "bearer");
        assert_eq!(parsed.scope, "");
    }

    #[test]
    fn debug_does_not_leak_token() {
        let token = TokenRecord::from_raw_access_token("secret-token-value", fixed_now());
        assert!(!format!("{token:?}").contains("secret-token-value"));
    }
}
