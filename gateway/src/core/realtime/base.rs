//! Base traits and types for live tutoring session clients.
//!
//! A session client owns one conversation with one provider. Two wire
//! protocols sit behind the same capability set:
//!
//! - a peer connection (SDP offer/answer, audio tracks, `oai-events` datachannel)
//! - a socket (one WebSocket multiplexing PCM audio and JSON control)
//!
//! Clients report progress through an [`EventSink`] as [`SessionEvent`]s.
//!
//! [`EventSink`]: super::sink::EventSink

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

use super::sink::EventSink;
use crate::core::audio::AudioError;
use crate::core::topic::Topic;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while running a live session.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// A credential or endpoint needed to start is not configured
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    /// The provider or token service rejected our credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The token service asked us to back off
    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The peer sent something we cannot interpret
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Network, socket or peer-connection failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The provider reported an error of its own
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Microphone access was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `start` was called on a client that already ran
    #[error("Session already started")]
    AlreadyStarted,

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Session Events
// =============================================================================

/// Event delivered from a session client to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport established and the model is ready to talk
    Connected,
    /// One complete teacher turn
    TeacherMessage(String),
    /// Diagnostic line (hidden unless diagnostics are shown)
    System(String),
    /// Human-readable failure
    Error(String),
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "connected"),
            SessionEvent::TeacherMessage(text) => write!(f, "teacher: {text}"),
            SessionEvent::System(text) => write!(f, "system: {text}"),
            SessionEvent::Error(text) => write!(f, "error: {text}"),
        }
    }
}

// =============================================================================
// Preferences
// =============================================================================

/// Which provider family runs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreference {
    #[default]
    OpenAi,
    Gemini,
    /// Scripted offline session
    Mock,
}

impl ProviderPreference {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "peer" | "webrtc" => Some(ProviderPreference::OpenAi),
            "gemini" | "socket" | "gemini-live" => Some(ProviderPreference::Gemini),
            "mock" => Some(ProviderPreference::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderPreference::OpenAi => write!(f, "openai"),
            ProviderPreference::Gemini => write!(f, "gemini"),
            ProviderPreference::Mock => write!(f, "mock"),
        }
    }
}

/// Model tier for the peer-connection provider.
///
/// The wire names double as the `mode` query parameter of the mint endpoint;
/// the server maps them to concrete model ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RealtimeModelPreference {
    #[default]
    #[serde(rename = "realtimeMini")]
    RealtimeMini,
    #[serde(rename = "realtime")]
    Realtime,
}

impl RealtimeModelPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeModelPreference::RealtimeMini => "realtimeMini",
            RealtimeModelPreference::Realtime => "realtime",
        }
    }

    /// Exact wire-name match
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "realtimeMini" => Some(RealtimeModelPreference::RealtimeMini),
            "realtime" => Some(RealtimeModelPreference::Realtime),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RealtimeModelPreference::RealtimeMini => "Realtime Mini",
            RealtimeModelPreference::Realtime => "Realtime",
        }
    }

    pub fn all() -> &'static [RealtimeModelPreference] {
        &[
            RealtimeModelPreference::RealtimeMini,
            RealtimeModelPreference::Realtime,
        ]
    }
}

impl fmt::Display for RealtimeModelPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Short-lived provider credential for exactly one session attempt.
///
/// Never persisted; the value is wiped when dropped.
#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub session: Option<serde_json::Value>,
}

impl ClientSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
            session: None,
        }
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Drop for ClientSecret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

// =============================================================================
// Session Client Trait
// =============================================================================

/// Capability set shared by every live session client.
///
/// # Contract
///
/// - `start` is called at most once per client; it returns after kicking off
///   the connection and reports progress through `sink`.
/// - `stop` is idempotent. Once it returns, `sink` receives nothing more.
/// - While muted, no microphone audio leaves the device.
#[enum_dispatch]
pub trait SessionClient: Send {
    /// Whether this client records from the microphone itself
    fn captures_microphone(&self) -> bool;

    /// Begin the session on `topic`. Must be called within a tokio runtime.
    fn start(&mut self, topic: Topic, sink: EventSink) -> RealtimeResult<()>;

    /// Tear the session down and release every resource.
    fn stop(&mut self);

    fn set_muted(&mut self, muted: bool);
}
