//! Configuration module for the tutor gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use tutor_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod yaml;

pub use crate::core::realtime::RealtimeModelPreference;

/// Default lifetime of a minted client secret
pub const DEFAULT_EPHEMERAL_TTL_SECONDS: i64 = 600;
/// Lower bound applied to the configured client secret lifetime
pub const MIN_EPHEMERAL_TTL_SECONDS: i64 = 60;
/// Upper bound applied to the configured client secret lifetime
pub const MAX_EPHEMERAL_TTL_SECONDS: i64 = 3600;
/// Default per-address mint requests per minute
pub const DEFAULT_TOKEN_RPM: u32 = 30;
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_REALTIME_MODEL_ID: &str = "gpt-realtime";
pub const DEFAULT_REALTIME_MINI_MODEL_ID: &str = "gpt-realtime-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    // TLS configuration
    pub tls: Option<TlsConfig>,

    // Security
    /// Comma-separated list of allowed CORS origins, or "*"
    pub cors_allowed_origins: Option<String>,

    // Provider
    /// Operator key used to mint client secrets. Never leaves the server.
    pub openai_api_key: Option<String>,
    /// Base URL of the provider REST API (overridable for staging and tests)
    pub openai_base_url: String,
    /// Timeout applied to the provider mint call
    pub provider_timeout_seconds: u64,

    // Token service
    /// Secret shared with the device; the endpoint is disabled without it
    pub token_service_shared_secret: Option<String>,
    /// Per-address mint requests allowed in each 60 second window
    pub token_rate_limit_per_minute: u32,
    /// Raw configured client secret lifetime; see [`ServerConfig::ephemeral_ttl_seconds`]
    pub ephemeral_ttl_seconds: i64,

    // Session defaults
    pub realtime_voice: String,
    pub realtime_model_id: String,
    pub realtime_mini_model_id: String,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.token_service_shared_secret {
            secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, or if an
    /// environment variable has an invalid format.
    ///
    /// # Example
    /// ```rust,no_run
    /// use tutor_gateway::config::ServerConfig;
    /// use std::path::PathBuf;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
    /// println!("Server listening on {}", config.address());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs, so it is already part of the environment here
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        merge::merge_config(Some(yaml_config))
    }

    /// Get the server address as a string ("host:port")
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether the mint endpoint accepts callers at all
    pub fn is_token_service_enabled(&self) -> bool {
        self.token_service_shared_secret
            .as_deref()
            .is_some_and(|secret| !secret.is_empty())
    }

    /// Client secret lifetime, clamped to `[60, 3600]` seconds
    pub fn ephemeral_ttl_seconds(&self) -> i64 {
        self.ephemeral_ttl_seconds
            .clamp(MIN_EPHEMERAL_TTL_SECONDS, MAX_EPHEMERAL_TTL_SECONDS)
    }

    /// Map a requested model preference onto the provider model identifier.
    ///
    /// The table lives on the server so the device cannot pick arbitrary models.
    pub fn model_id_for(&self, preference: RealtimeModelPreference) -> &str {
        match preference {
            RealtimeModelPreference::Realtime => &self.realtime_model_id,
            RealtimeModelPreference::RealtimeMini => &self.realtime_mini_model_id,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 3001,
        tls: None,
        cors_allowed_origins: None,
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        provider_timeout_seconds: 30,
        token_service_shared_secret: Some("shared-secret".to_string()),
        token_rate_limit_per_minute: DEFAULT_TOKEN_RPM,
        ephemeral_ttl_seconds: DEFAULT_EPHEMERAL_TTL_SECONDS,
        realtime_voice: DEFAULT_VOICE.to_string(),
        realtime_model_id: DEFAULT_REALTIME_MODEL_ID.to_string(),
        realtime_mini_model_id: DEFAULT_REALTIME_MINI_MODEL_ID.to_string(),
    }
}
