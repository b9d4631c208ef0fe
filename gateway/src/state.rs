use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::middleware::RateLimiter;

/// Shared application state for the HTTP surface
pub struct AppState {
    pub config: ServerConfig,
    /// Pooled client for provider calls
    pub http_client: reqwest::Client,
    /// Process-wide mint rate limiter
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build provider HTTP client ({e}), using defaults");
                reqwest::Client::new()
            });
        let rate_limiter = RateLimiter::new(config.token_rate_limit_per_minute);

        tracing::info!(
            provider_key_configured = config.openai_api_key.is_some(),
            token_service_enabled = config.is_token_service_enabled(),
            rate_limit_per_minute = config.token_rate_limit_per_minute,
            "Application state initialized"
        );

        Arc::new(Self {
            config,
            http_client,
            rate_limiter,
        })
    }
}
