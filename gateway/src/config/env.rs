use std::env;
use std::path::PathBuf;

use super::{
    DEFAULT_EPHEMERAL_TTL_SECONDS, DEFAULT_OPENAI_BASE_URL, DEFAULT_REALTIME_MINI_MODEL_ID,
    DEFAULT_REALTIME_MODEL_ID, DEFAULT_TOKEN_RPM, DEFAULT_VOICE, ServerConfig, TlsConfig,
};

/// Read an environment variable, treating blank values as unset
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Lenient numeric parse: anything unparseable falls back to `default`.
///
/// The token endpoint has always treated a malformed limit or lifetime as
/// "use the default" rather than refusing to start.
pub(super) fn env_number_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `PORT` or `PROVIDER_TIMEOUT_SECONDS` is not a valid
    /// number, or if only one of `TLS_CERT_PATH` / `TLS_KEY_PATH` is set.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let host = env_string("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_string("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| format!("Invalid PORT value '{raw}': {e}"))?,
            None => 3001,
        };

        let tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into());
            }
        };

        let provider_timeout_seconds = match env_string("PROVIDER_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| format!("Invalid PROVIDER_TIMEOUT_SECONDS value '{raw}': {e}"))?,
            None => 30,
        };

        Ok(ServerConfig {
            host,
            port,
            tls,
            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            openai_api_key: env_string("OPENAI_API_KEY"),
            openai_base_url: env_string("OPENAI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            provider_timeout_seconds,
            token_service_shared_secret: env_string("TOKEN_SERVICE_SHARED_SECRET"),
            token_rate_limit_per_minute: env_number_or("REALTIME_TOKEN_RPM", DEFAULT_TOKEN_RPM),
            ephemeral_ttl_seconds: env_number_or(
                "REALTIME_EPHEMERAL_TTL_SECONDS",
                DEFAULT_EPHEMERAL_TTL_SECONDS,
            ),
            realtime_voice: env_string("REALTIME_VOICE")
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            realtime_model_id: env_string("REALTIME_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL_ID.to_string()),
            realtime_mini_model_id: env_string("REALTIME_MINI_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_REALTIME_MINI_MODEL_ID.to_string()),
        })
    }
}
