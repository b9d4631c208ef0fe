use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in the
/// file override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls_cert_path: "/etc/tutor/cert.pem"
///   tls_key_path: "/etc/tutor/key.pem"
///
/// providers:
///   openai_api_key: "sk-..."
///   openai_base_url: "https://api.openai.com/v1"
///   timeout_seconds: 30
///
/// token_service:
///   shared_secret: "device-shared-secret"
///   rate_limit_per_minute: 30
///   ephemeral_ttl_seconds: 600
///
/// realtime:
///   voice: "alloy"
///   model_id: "gpt-realtime"
///   mini_model_id: "gpt-realtime-mini"
///
/// security:
///   cors_allowed_origins: "https://tutor.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub token_service: Option<TokenServiceYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

/// Provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Mint endpoint settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TokenServiceYaml {
    pub shared_secret: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub ephemeral_ttl_seconds: Option<i64>,
}

/// Session defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub voice: Option<String>,
    pub model_id: Option<String>,
    pub mini_model_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load and parse a YAML configuration file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

providers:
  openai_api_key: "sk-yaml"
  timeout_seconds: 10

token_service:
  shared_secret: "s3cret"
  rate_limit_per_minute: 5
  ephemeral_ttl_seconds: 120

realtime:
  voice: "verse"
  mini_model_id: "gpt-realtime-mini-2025"

security:
  cors_allowed_origins: "*"
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let providers = config.providers.unwrap();
        assert_eq!(providers.openai_api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(providers.timeout_seconds, Some(10));

        let token_service = config.token_service.unwrap();
        assert_eq!(token_service.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(token_service.rate_limit_per_minute, Some(5));
        assert_eq!(token_service.ephemeral_ttl_seconds, Some(120));

        let realtime = config.realtime.unwrap();
        assert_eq!(realtime.voice.as_deref(), Some("verse"));
        assert_eq!(realtime.model_id, None);

        assert_eq!(
            config.security.unwrap().cors_allowed_origins.as_deref(),
            Some("*")
        );
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.token_service.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: 9000\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.server.unwrap().port, Some(9000));
    }
}
