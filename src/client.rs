//! Authenticated access to the remote API.

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use crate::auth::{Authenticator, TokenRecord};
use crate::config::{AuthConfig, Endpoints};
use crate::error::AuthError;

/// Attaches the bearer token to outgoing requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    token: TokenRecord,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, endpoints: Endpoints, token: TokenRecord) -> Self {
        Self {
            http,
            endpoints,
            token,
        }
    }

    /// Authenticate (cache or browser grant) and return a ready client.
    pub async fn connect(config: AuthConfig) -> Result<Self, AuthError> {
        let endpoints = config.endpoints.clone();
        let mut authenticator = Authenticator::new(config);
        let authenticated = authenticator.authenticate().await?;
        Ok(Self::new(
            reqwest::Client::new(),
            endpoints,
            authenticated.token,
        ))
    }

    pub fn token(&self) -> &TokenRecord {
        &self.token
    }

    /// Request against `path` on the API base URL with auth headers set.
    pub fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let bearer = HeaderValue::from_str(&self.token.bearer_header()).map_err(|_| {
            AuthError::InvalidResponse("access token is not a valid header value".to_string())
        })?;
        let is_post = method == Method::POST;
        let mut builder = self
            .http
            .request(method, self.endpoints.api_url(path))
            .header(AUTHORIZATION, bearer);
        if is_post {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        Ok(builder)
    }

    pub fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, AuthError> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, AuthError> {
        self.request(Method::POST, path)
    }
}
