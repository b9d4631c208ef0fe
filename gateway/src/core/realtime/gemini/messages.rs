//! Gemini Live wire messages.
//!
//! Client messages are single-key envelopes (`{"setup": ...}`,
//! `{"clientContent": ...}`, `{"realtimeInput": ...}`), which is exactly
//! serde's externally tagged enum representation. Server messages carry at
//! most one of several optional top-level keys; unknown keys are ignored.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::audio_mime_type;
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

// =============================================================================
// Shared content types
// =============================================================================

/// Base64 payload with its mime type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    /// PCM16LE audio at `sample_rate`
    pub fn pcm(pcm: &[u8], sample_rate: u32) -> Self {
        Self {
            mime_type: audio_mime_type(sample_rate),
            data: BASE64_STANDARD.encode(pcm),
        }
    }

    pub fn is_pcm_audio(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("audio/pcm")
    }

    pub fn decode(&self) -> RealtimeResult<Vec<u8>> {
        BASE64_STANDARD
            .decode(&self.data)
            .map_err(|e| RealtimeError::ProtocolViolation(format!("invalid inline data: {e}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

// =============================================================================
// Client messages
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn to_json(&self) -> RealtimeResult<String> {
        serde_json::to_string(self)
            .map_err(|e| RealtimeError::ProtocolViolation(format!("failed to encode message: {e}")))
    }

    /// One complete user text turn
    pub fn user_turn(text: impl Into<String>) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::new("user", text)],
            turn_complete: true,
        })
    }

    pub fn audio(pcm: &[u8], sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Some(Blob::pcm(pcm, sample_rate)),
            audio_stream_end: None,
        })
    }

    pub fn audio_stream_end() -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: None,
            audio_stream_end: Some(true),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub realtime_input_config: RealtimeInputConfig,
    pub input_audio_transcription: AudioTranscriptionConfig,
    pub output_audio_transcription: AudioTranscriptionConfig,
    pub session_resumption: SessionResumptionConfig,
}

impl Setup {
    /// Audio-only responses, server-side activity detection, both
    /// transcriptions on, no resumption handle.
    pub fn new(model: &str, system_instruction: String) -> Self {
        Self {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
            },
            system_instruction: Content::new("system", system_instruction),
            realtime_input_config: RealtimeInputConfig {
                automatic_activity_detection: AutomaticActivityDetection { disabled: false },
            },
            input_audio_transcription: AudioTranscriptionConfig {},
            output_audio_transcription: AudioTranscriptionConfig {},
            session_resumption: SessionResumptionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputConfig {
    pub automatic_activity_detection: AutomaticActivityDetection,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutomaticActivityDetection {
    pub disabled: bool,
}

/// Serialized as `{}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionResumptionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

// =============================================================================
// Server messages
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| RealtimeError::ProtocolViolation(format!("unparseable server message: {e}")))
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub generation_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
}

impl ServerContent {
    /// `turnComplete` or `generationComplete`
    pub fn completes_turn(&self) -> bool {
        self.turn_complete == Some(true) || self.generation_complete == Some(true)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted == Some(true)
    }

    /// Inline PCM audio parts in arrival order
    pub fn audio_parts(&self) -> impl Iterator<Item = &Blob> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|blob| blob.is_pcm_audio())
    }

    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn to_value(message: &ClientMessage) -> Value {
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_setup_shape() {
        let setup = ClientMessage::Setup(Setup::new("models/test", "Be kind.".to_string()));
        let value = to_value(&setup);

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/test",
                    "generationConfig": {"responseModalities": ["AUDIO"]},
                    "systemInstruction": {"role": "system", "parts": [{"text": "Be kind."}]},
                    "realtimeInputConfig": {"automaticActivityDetection": {"disabled": false}},
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {},
                    "sessionResumption": {}
                }
            })
        );
    }

    #[test]
    fn test_user_turn_and_stream_end() {
        assert_eq!(
            to_value(&ClientMessage::user_turn("Hi")),
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "Hi"}]}], "turnComplete": true}})
        );
        assert_eq!(
            to_value(&ClientMessage::audio_stream_end()),
            json!({"realtimeInput": {"audioStreamEnd": true}})
        );
    }

    #[test]
    fn test_audio_blob() {
        let value = to_value(&ClientMessage::audio(&[1, 0, 2, 0], 16_000));
        assert_eq!(value["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(value["realtimeInput"]["audio"]["data"], "AQACAA==");
        assert!(value["realtimeInput"].get("audioStreamEnd").is_none());
    }

    #[test]
    fn test_parse_server_content() {
        let msg = ServerMessage::parse(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"text":"Hello"},
                {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AQACAA=="}},
                {"inlineData":{"mimeType":"image/png","data":"AA=="}}
            ]},"outputTranscription":{"text":"Hello there"},"turnComplete":true}}"#,
        )
        .unwrap();

        let content = msg.server_content.unwrap();
        assert!(content.completes_turn());
        assert!(!content.is_interrupted());
        assert_eq!(content.text_parts().collect::<Vec<_>>(), vec!["Hello"]);
        let audio: Vec<_> = content.audio_parts().collect();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].decode().unwrap(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_parse_setup_complete_and_go_away() {
        assert!(ServerMessage::parse(r#"{"setupComplete":{}}"#)
            .unwrap()
            .is_setup_complete());

        let go_away = ServerMessage::parse(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
        assert_eq!(go_away.go_away.unwrap().time_left.as_deref(), Some("10s"));

        // Unknown keys are tolerated
        let other = ServerMessage::parse(r#"{"usageMetadata":{"totalTokenCount":3}}"#).unwrap();
        assert!(!other.is_setup_complete());
        assert!(other.server_content.is_none());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            ServerMessage::parse("not json"),
            Err(RealtimeError::ProtocolViolation(_))
        ));
    }
}
