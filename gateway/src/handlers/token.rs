//! Credential mint endpoint
//!
//! `GET /api/realtime/token?mode=<realtimeMini|realtime>&topic=<t>&learner=<l>`
//!
//! Method, caller secret and rate limit are enforced by middleware before this
//! handler runs. The handler turns the query into a constrained session
//! request, signs it with the operator key and hands back only the
//! short-lived client secret.

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::header::CONTENT_TYPE,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::core::instructions::{TEACHER_INSTRUCTIONS, compose_instructions};
use crate::core::realtime::RealtimeModelPreference;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::trim_and_truncate;

/// Longest topic title forwarded into the prompt
pub const MAX_TOPIC_CHARS: usize = 60;
/// Longest learner snippet forwarded into the prompt
pub const MAX_LEARNER_CHARS: usize = 800;

/// Query parameters of a mint request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MintQuery {
    pub mode: Option<String>,
    pub topic: Option<String>,
    pub learner: Option<String>,
}

/// Body of the provider's client secret creation call
#[derive(Debug, Serialize)]
pub struct ClientSecretRequest {
    pub expires_after: ExpiresAfter,
    pub session: SessionSpec,
}

#[derive(Debug, Serialize)]
pub struct ExpiresAfter {
    pub anchor: &'static str,
    pub seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionSpec {
    #[serde(rename = "type")]
    pub session_type: &'static str,
    pub model: String,
    pub instructions: String,
    pub audio: SessionAudio,
}

#[derive(Debug, Serialize)]
pub struct SessionAudio {
    pub output: AudioOutput,
}

#[derive(Debug, Serialize)]
pub struct AudioOutput {
    pub voice: String,
}

impl MintQuery {
    /// Requested model preference; absent means the mini model.
    pub fn model_preference(&self) -> AppResult<RealtimeModelPreference> {
        match self.mode.as_deref() {
            None => Ok(RealtimeModelPreference::default()),
            Some(raw) => {
                RealtimeModelPreference::parse(raw).ok_or_else(|| AppError::InvalidMode {
                    requested: raw.to_string(),
                    allowed: RealtimeModelPreference::all()
                        .iter()
                        .map(|m| m.as_str())
                        .collect(),
                })
            }
        }
    }

    pub fn topic(&self) -> Option<String> {
        self.topic
            .as_deref()
            .and_then(|t| trim_and_truncate(t, MAX_TOPIC_CHARS))
    }

    pub fn learner(&self) -> Option<String> {
        self.learner
            .as_deref()
            .and_then(|l| trim_and_truncate(l, MAX_LEARNER_CHARS))
    }
}

/// Build the provider request for a validated mint query
pub fn build_client_secret_request(
    state: &AppState,
    query: &MintQuery,
) -> AppResult<ClientSecretRequest> {
    let preference = query.model_preference()?;
    let topic = query.topic();
    let learner = query.learner();

    let instructions =
        compose_instructions(TEACHER_INSTRUCTIONS, learner.as_deref(), topic.as_deref());

    Ok(ClientSecretRequest {
        expires_after: ExpiresAfter {
            anchor: "created_at",
            seconds: state.config.ephemeral_ttl_seconds(),
        },
        session: SessionSpec {
            session_type: "realtime",
            model: state.config.model_id_for(preference).to_string(),
            instructions,
            audio: SessionAudio {
                output: AudioOutput {
                    voice: state.config.realtime_voice.clone(),
                },
            },
        },
    })
}

/// Mint a short-lived client secret for one live session.
pub async fn mint_token(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MintQuery>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Some(api_key) = state.config.openai_api_key.as_deref() else {
        return Err(AppError::MissingProviderKey);
    };
    let Query(query) = query.map_err(|e| AppError::InvalidQuery(e.body_text()))?;

    let request_body = build_client_secret_request(&state, &query)?;
    let url = format!(
        "{}/realtime/client_secrets",
        state.config.openai_base_url.trim_end_matches('/')
    );

    tracing::info!(
        model = %request_body.session.model,
        ttl_seconds = request_body.expires_after.seconds,
        has_topic = query.topic.is_some(),
        has_learner = query.learner.is_some(),
        "Minting realtime client secret"
    );

    let response = state
        .http_client
        .post(&url)
        .bearer_auth(api_key)
        .header(CONTENT_TYPE, "application/json")
        .json(&request_body)
        .send()
        .await
        .map_err(|e| AppError::ProviderTransport(e.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| AppError::ProviderTransport(e.to_string()))?;
    let data: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));

    if !status.is_success() {
        tracing::warn!(status = %status, "Provider rejected client secret request");
        return Err(AppError::Provider {
            status,
            details: data,
        });
    }

    tracing::debug!("Client secret minted");

    Ok(Json(device_view(&data)))
}

/// Only the fields the device needs; fields the provider left out stay out
fn device_view(data: &Value) -> Value {
    let forwarded: Map<String, Value> = ["value", "expires_at", "session"]
        .into_iter()
        .filter_map(|key| data.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();
    Value::Object(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn query(mode: Option<&str>, topic: Option<&str>, learner: Option<&str>) -> MintQuery {
        MintQuery {
            mode: mode.map(str::to_string),
            topic: topic.map(str::to_string),
            learner: learner.map(str::to_string),
        }
    }

    #[test]
    fn test_default_mode_is_mini() {
        let q = query(None, None, None);
        assert_eq!(
            q.model_preference().unwrap(),
            RealtimeModelPreference::RealtimeMini
        );
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let err = query(Some("turbo"), None, None)
            .model_preference()
            .unwrap_err();
        match err {
            AppError::InvalidMode { requested, allowed } => {
                assert_eq!(requested, "turbo");
                assert_eq!(allowed, vec!["realtimeMini", "realtime"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_topic_boundaries() {
        let sixty = "t".repeat(60);
        let sixty_one = "t".repeat(61);

        assert_eq!(query(None, Some(&sixty), None).topic().unwrap(), sixty);
        assert_eq!(query(None, Some(&sixty_one), None).topic().unwrap(), sixty);
        assert_eq!(query(None, Some("   "), None).topic(), None);
    }

    #[test]
    fn test_learner_boundaries() {
        let exact = "l".repeat(800);
        let over = "l".repeat(801);

        assert_eq!(query(None, None, Some(&exact)).learner().unwrap().len(), 800);
        assert_eq!(query(None, None, Some(&over)).learner().unwrap().len(), 800);
    }

    #[test]
    fn test_request_body_shape() {
        let state = AppState::new(test_config());
        let body = build_client_secret_request(
            &state,
            &query(Some("realtime"), Some("  My town  "), Some("- Age: 10")),
        )
        .unwrap();

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["expires_after"]["anchor"], "created_at");
        assert_eq!(value["expires_after"]["seconds"], 600);
        assert_eq!(value["session"]["type"], "realtime");
        assert_eq!(value["session"]["model"], "gpt-realtime");
        assert_eq!(value["session"]["audio"]["output"]["voice"], "alloy");

        let instructions = value["session"]["instructions"].as_str().unwrap();
        assert!(instructions.starts_with(TEACHER_INSTRUCTIONS));
        assert!(instructions.ends_with("\n\n- Age: 10\n\nSelected topic: My town"));
    }

    #[test]
    fn test_request_ttl_clamped() {
        let mut config = test_config();
        config.ephemeral_ttl_seconds = 5;
        let state = AppState::new(config);

        let body = build_client_secret_request(&state, &query(None, None, None)).unwrap();
        assert_eq!(body.expires_after.seconds, 60);
        assert_eq!(body.session.model, "gpt-realtime-mini");
    }

    #[test]
    fn test_device_view_skips_absent_fields() {
        let view = device_view(&json!({ "value": "ek", "internal": 1 }));
        assert_eq!(view, json!({ "value": "ek" }));

        let view = device_view(&json!({ "value": "ek", "expires_at": 9, "session": null }));
        assert_eq!(view, json!({ "value": "ek", "expires_at": 9, "session": null }));
    }
}
