//! Events exchanged over the `oai-events` datachannel.

use serde::{Deserialize, Serialize};

use crate::core::realtime::base::{RealtimeError, RealtimeResult, SessionEvent};

// =============================================================================
// Client Events
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Ask the model to respond; sent once right after connecting so the
    /// teacher speaks first
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseParams },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseParams {
    pub output_modalities: Vec<String>,
}

impl ClientEvent {
    /// `response.create` asking for audio and text
    pub fn greeting() -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseParams {
                output_modalities: vec!["audio".to_string(), "text".to_string()],
            },
        }
    }

    pub fn to_json(&self) -> RealtimeResult<String> {
        serde_json::to_string(self)
            .map_err(|e| RealtimeError::ProtocolViolation(format!("failed to encode event: {e}")))
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Server events this client reacts to; everything else is `Unknown`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone,

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "error", alias = "invalid_request_error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        /// Either a string or an object with a `message`
        #[serde(default)]
        error: Option<serde_json::Value>,
    },

    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| RealtimeError::ProtocolViolation(format!("unparseable event: {e}")))
    }
}

fn error_message(message: Option<String>, error: Option<serde_json::Value>) -> String {
    message
        .or_else(|| match error {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Object(map)) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Folds streamed text deltas into whole teacher turns
#[derive(Debug, Default)]
pub struct TextTurnAssembler {
    pending: String,
}

impl TextTurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one server event into at most one session event.
    pub fn handle(&mut self, event: ServerEvent) -> Option<SessionEvent> {
        match event {
            ServerEvent::SessionCreated => Some(SessionEvent::System("Session created.".into())),
            ServerEvent::SessionUpdated => Some(SessionEvent::System("Session updated.".into())),
            ServerEvent::OutputTextDelta { delta } => {
                self.pending.push_str(&delta);
                None
            }
            ServerEvent::OutputTextDone => {
                let turn = self.flush();
                self.pending.clear();
                turn
            }
            // Some responses only finish here; flush whatever is left
            ServerEvent::ResponseDone => self.flush(),
            ServerEvent::Error { message, error } => Some(SessionEvent::Error(format!(
                "Realtime error: {}",
                error_message(message, error)
            ))),
            ServerEvent::Unknown => None,
        }
    }

    fn flush(&mut self) -> Option<SessionEvent> {
        let text = self.pending.trim().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(SessionEvent::TeacherMessage(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut TextTurnAssembler, json: &str) -> Option<SessionEvent> {
        assembler.handle(ServerEvent::parse(json).unwrap())
    }

    #[test]
    fn test_greeting_event() {
        assert_eq!(
            ClientEvent::greeting().to_json().unwrap(),
            r#"{"type":"response.create","response":{"output_modalities":["audio","text"]}}"#
        );
    }

    #[test]
    fn test_deltas_become_one_turn() {
        let mut assembler = TextTurnAssembler::new();
        assert_eq!(
            feed(&mut assembler, r#"{"type":"response.output_text.delta","delta":"Hi "}"#),
            None
        );
        assert_eq!(
            feed(&mut assembler, r#"{"type":"response.output_text.delta","delta":"there! "}"#),
            None
        );
        assert_eq!(
            feed(&mut assembler, r#"{"type":"response.output_text.done","text":"Hi there!"}"#),
            Some(SessionEvent::TeacherMessage("Hi there!".into()))
        );
        // Nothing left for response.done
        assert_eq!(feed(&mut assembler, r#"{"type":"response.done","response":{}}"#), None);
    }

    #[test]
    fn test_response_done_flushes_residue() {
        let mut assembler = TextTurnAssembler::new();
        feed(&mut assembler, r#"{"type":"response.output_text.delta","delta":"Bye"}"#);
        assert_eq!(
            feed(&mut assembler, r#"{"type":"response.done"}"#),
            Some(SessionEvent::TeacherMessage("Bye".into()))
        );
    }

    #[test]
    fn test_whitespace_only_turn_is_dropped() {
        let mut assembler = TextTurnAssembler::new();
        feed(&mut assembler, r#"{"type":"response.output_text.delta","delta":"  "}"#);
        assert_eq!(
            feed(&mut assembler, r#"{"type":"response.output_text.done"}"#),
            None
        );
    }

    #[test]
    fn test_informational_and_unknown_events() {
        let mut assembler = TextTurnAssembler::new();
        assert_eq!(
            feed(&mut assembler, r#"{"type":"session.created","session":{"id":"s"}}"#),
            Some(SessionEvent::System("Session created.".into()))
        );
        assert_eq!(
            feed(&mut assembler, r#"{"type":"output_audio_buffer.started"}"#),
            None
        );
    }

    #[test]
    fn test_error_message_shapes() {
        let mut assembler = TextTurnAssembler::new();
        assert_eq!(
            feed(
                &mut assembler,
                r#"{"type":"error","error":{"type":"invalid_request_error","message":"Bad voice"}}"#
            ),
            Some(SessionEvent::Error("Realtime error: Bad voice".into()))
        );
        assert_eq!(
            feed(&mut assembler, r#"{"type":"invalid_request_error","message":"Nope"}"#),
            Some(SessionEvent::Error("Realtime error: Nope".into()))
        );
        assert_eq!(
            feed(&mut assembler, r#"{"type":"error"}"#),
            Some(SessionEvent::Error("Realtime error: Unknown error".into()))
        );
    }
}
