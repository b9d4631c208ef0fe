//! Device-side client of the credential mint endpoint.
//!
//! The peer-connection client never sees the operator's provider key: it asks
//! the mint endpoint for a short-lived client secret, authenticating with the
//! token-service shared secret.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, RETRY_AFTER};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use url::Url;

use super::base::{ClientSecret, RealtimeError, RealtimeModelPreference, RealtimeResult};
use crate::auth::SHARED_SECRET_HEADER;

/// Path of the mint endpoint relative to the token service base URL
pub const TOKEN_ENDPOINT_PATH: &str = "api/realtime/token";

#[derive(Debug, Error)]
pub enum TokenServiceError {
    #[error("Missing TOKEN_SERVICE_BASE_URL")]
    MissingBaseUrl,

    #[error("Missing TOKEN_SERVICE_SHARED_SECRET")]
    MissingSharedSecret,

    #[error("Invalid response from token service: {0}")]
    InvalidResponse(String),

    #[error("Token service HTTP error (status: {status}){}", body_suffix(.body))]
    Http {
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Token service request failed: {0}")]
    Transport(String),
}

fn body_suffix(body: &str) -> String {
    if body.trim().is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl From<TokenServiceError> for RealtimeError {
    fn from(err: TokenServiceError) -> Self {
        match err {
            TokenServiceError::MissingBaseUrl | TokenServiceError::MissingSharedSecret => {
                RealtimeError::ConfigurationMissing(err.to_string())
            }
            TokenServiceError::Http {
                status: 401 | 403, ..
            } => RealtimeError::AuthenticationFailed(err.to_string()),
            TokenServiceError::Http {
                status: 429,
                retry_after_secs,
                ..
            } => RealtimeError::RateLimited { retry_after_secs },
            TokenServiceError::Http { .. } => RealtimeError::ProviderError(err.to_string()),
            TokenServiceError::InvalidResponse(_) => {
                RealtimeError::ProtocolViolation(err.to_string())
            }
            TokenServiceError::Transport(_) => RealtimeError::TransportFailure(err.to_string()),
        }
    }
}

/// Where the device reaches the mint endpoint
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenServiceConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl TokenServiceConfig {
    pub fn new(base_url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            shared_secret: Some(shared_secret.into()),
        }
    }

    fn non_blank(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// `{base}/api/realtime/token` with the query for `request`
    pub fn token_url(&self, request: &SecretRequest) -> Result<Url, TokenServiceError> {
        let base = Self::non_blank(&self.base_url).ok_or(TokenServiceError::MissingBaseUrl)?;
        let mut url = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .and_then(|base| base.join(TOKEN_ENDPOINT_PATH))
            .map_err(|e| TokenServiceError::InvalidResponse(format!("bad base URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("mode", request.mode.as_str());
            if let Some(topic) = request.topic.as_deref().filter(|t| !t.trim().is_empty()) {
                query.append_pair("topic", topic);
            }
            if let Some(learner) = request.learner.as_deref().filter(|l| !l.trim().is_empty()) {
                query.append_pair("learner", learner);
            }
        }
        Ok(url)
    }
}

impl fmt::Debug for TokenServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenServiceConfig")
            .field("base_url", &self.base_url)
            .field("shared_secret_configured", &Self::non_blank(&self.shared_secret).is_some())
            .finish()
    }
}

/// Parameters of one mint request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretRequest {
    pub mode: RealtimeModelPreference,
    pub topic: Option<String>,
    pub learner: Option<String>,
}

/// Anything that can hand out a client secret for one session attempt
#[async_trait]
pub trait ClientSecretSource: Send + Sync {
    async fn fetch(&self, request: &SecretRequest) -> RealtimeResult<ClientSecret>;
}

pub struct TokenServiceClient {
    config: TokenServiceConfig,
    http: reqwest::Client,
}

impl TokenServiceClient {
    pub fn new(config: TokenServiceConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: TokenServiceConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub async fn fetch_client_secret(
        &self,
        request: &SecretRequest,
    ) -> Result<ClientSecret, TokenServiceError> {
        let url = self.config.token_url(request)?;
        let secret = TokenServiceConfig::non_blank(&self.config.shared_secret)
            .ok_or(TokenServiceError::MissingSharedSecret)?;

        tracing::debug!(mode = %request.mode, "Requesting client secret");
        let response = self
            .http
            .get(url)
            .header(SHARED_SECRET_HEADER, secret)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TokenServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response
            .text()
            .await
            .map_err(|e| TokenServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Token service rejected request");
            return Err(TokenServiceError::Http {
                status: status.as_u16(),
                body,
                retry_after_secs,
            });
        }

        serde_json::from_str(&body).map_err(|e| TokenServiceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ClientSecretSource for TokenServiceClient {
    async fn fetch(&self, request: &SecretRequest) -> RealtimeResult<ClientSecret> {
        Ok(self.fetch_client_secret(request).await?)
    }
}

/// Source returning a secret obtained elsewhere
pub struct StaticSecretSource {
    secret: ClientSecret,
}

impl StaticSecretSource {
    pub fn new(secret: ClientSecret) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl ClientSecretSource for StaticSecretSource {
    async fn fetch(&self, _request: &SecretRequest) -> RealtimeResult<ClientSecret> {
        Ok(self.secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> SecretRequest {
        SecretRequest {
            mode: RealtimeModelPreference::Realtime,
            topic: Some("Food & ordering".to_string()),
            learner: None,
        }
    }

    #[test]
    fn test_token_url() {
        let config = TokenServiceConfig::new("https://tokens.example.com/", "s");
        let url = config.token_url(&request()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://tokens.example.com/api/realtime/token?mode=realtime&topic=Food+%26+ordering"
        );

        let nested = TokenServiceConfig::new("https://example.com/edge", "s");
        assert_eq!(
            nested.token_url(&SecretRequest::default()).unwrap().as_str(),
            "https://example.com/edge/api/realtime/token?mode=realtimeMini"
        );
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let client = TokenServiceClient::new(TokenServiceConfig::default());
        assert!(matches!(
            client.fetch_client_secret(&request()).await,
            Err(TokenServiceError::MissingBaseUrl)
        ));

        let client = TokenServiceClient::new(TokenServiceConfig {
            base_url: Some("https://example.com".to_string()),
            shared_secret: Some(" ".to_string()),
        });
        let err = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, RealtimeError::ConfigurationMissing(_)));
    }

    #[tokio::test]
    async fn test_fetch_sends_secret_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/realtime/token"))
            .and(query_param("mode", "realtime"))
            .and(query_param("topic", "Food & ordering"))
            .and(header("x-token-service-secret", "shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "ek_abc",
                "expires_at": 1_700_000_600,
                "session": {"type": "realtime"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenServiceClient::new(TokenServiceConfig::new(server.uri(), "shared"));
        let secret = client.fetch(&request()).await.unwrap();
        assert_eq!(secret.value, "ek_abc");
        assert_eq!(secret.expires_at, Some(1_700_000_600));
    }

    #[tokio::test]
    async fn test_http_errors_map_to_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("mode", "realtime"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "60")
                    .set_body_json(json!({"error": "Rate limit exceeded"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("mode", "realtimeMini"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
            .mount(&server)
            .await;

        let client = TokenServiceClient::new(TokenServiceConfig::new(server.uri(), "wrong"));

        let limited = client.fetch(&request()).await.unwrap_err();
        assert!(matches!(
            limited,
            RealtimeError::RateLimited {
                retry_after_secs: Some(60)
            }
        ));

        let unauthorized = client
            .fetch(&SecretRequest::default())
            .await
            .unwrap_err();
        match unauthorized {
            RealtimeError::AuthenticationFailed(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("Unauthorized"));
            }
            other => panic!("Expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = TokenServiceClient::new(TokenServiceConfig::new(server.uri(), "s"));
        assert!(matches!(
            client.fetch_client_secret(&request()).await,
            Err(TokenServiceError::InvalidResponse(_))
        ));
    }
}
