use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Build the final configuration: environment first, YAML values on top.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        match (server.tls_cert_path, server.tls_key_path) {
            (Some(cert), Some(key)) => {
                config.tls = Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            }
            (None, None) => {}
            _ => {
                return Err(
                    "server.tls_cert_path and server.tls_key_path must be set together".into(),
                );
            }
        }
    }

    if let Some(providers) = yaml.providers {
        if let Some(key) = providers.openai_api_key.filter(|k| !k.trim().is_empty()) {
            config.openai_api_key = Some(key);
        }
        if let Some(base_url) = providers.openai_base_url {
            config.openai_base_url = base_url;
        }
        if let Some(timeout) = providers.timeout_seconds {
            config.provider_timeout_seconds = timeout;
        }
    }

    if let Some(token_service) = yaml.token_service {
        if let Some(secret) = token_service.shared_secret.filter(|s| !s.is_empty()) {
            config.token_service_shared_secret = Some(secret);
        }
        if let Some(rpm) = token_service.rate_limit_per_minute {
            config.token_rate_limit_per_minute = rpm;
        }
        if let Some(ttl) = token_service.ephemeral_ttl_seconds {
            config.ephemeral_ttl_seconds = ttl;
        }
    }

    if let Some(realtime) = yaml.realtime {
        if let Some(voice) = realtime.voice.filter(|v| !v.trim().is_empty()) {
            config.realtime_voice = voice.trim().to_string();
        }
        if let Some(model) = realtime.model_id {
            config.realtime_model_id = model;
        }
        if let Some(model) = realtime.mini_model_id {
            config.realtime_mini_model_id = model;
        }
    }

    if let Some(security) = yaml.security
        && let Some(origins) = security.cors_allowed_origins
    {
        config.cors_allowed_origins = Some(origins);
    }

    Ok(config)
}
