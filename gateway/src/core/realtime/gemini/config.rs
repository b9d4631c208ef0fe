//! Gemini Live configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::audio::{DOWNLINK_SAMPLE_RATE, UPLINK_SAMPLE_RATE};
use crate::core::topic::LearnerContext;

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Header carrying the API key on the upgrade request.
pub const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

/// Unsent microphone audio kept before the oldest frames are dropped
pub const UPLINK_MAX_QUEUED_SECONDS: f64 = 0.25;

/// Received audio kept ahead of the player before the oldest frames are dropped
pub const DOWNLINK_MAX_QUEUED_SECONDS: f64 = 0.25;

/// Buffers handed to the speaker but not yet played
pub const MAX_SCHEDULED_BUFFERS: usize = 6;

/// `4000` frames at 16 kHz
pub fn uplink_max_frames() -> usize {
    crate::core::audio::pcm::frames_for(UPLINK_SAMPLE_RATE, UPLINK_MAX_QUEUED_SECONDS)
}

/// `6000` frames at 24 kHz
pub fn downlink_max_frames() -> usize {
    crate::core::audio::pcm::frames_for(DOWNLINK_SAMPLE_RATE, DOWNLINK_MAX_QUEUED_SECONDS)
}

/// Mime type declared on every uplink audio blob
pub fn audio_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

// =============================================================================
// Models
// =============================================================================

/// Gemini Live model choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveModelPreference {
    /// Native audio dialog model
    #[default]
    NativeAudio,
    /// Half-cascade live model (text model with speech in and out)
    HalfCascade,
}

impl LiveModelPreference {
    /// Resource name sent in `setup.model`
    pub fn resource_name(&self) -> &'static str {
        match self {
            LiveModelPreference::NativeAudio => {
                "models/gemini-2.5-flash-native-audio-preview-09-2025"
            }
            LiveModelPreference::HalfCascade => "models/gemini-live-2.5-flash-preview",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LiveModelPreference::NativeAudio => "Gemini 2.5 Flash (native audio)",
            LiveModelPreference::HalfCascade => "Gemini Live 2.5 Flash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nativeAudio" => Some(LiveModelPreference::NativeAudio),
            "halfCascade" => Some(LiveModelPreference::HalfCascade),
            _ => None,
        }
    }

    pub fn all() -> &'static [LiveModelPreference] {
        &[
            LiveModelPreference::NativeAudio,
            LiveModelPreference::HalfCascade,
        ]
    }
}

impl fmt::Display for LiveModelPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

// =============================================================================
// Client configuration
// =============================================================================

/// Configuration of one socket live session.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveClientConfig {
    /// Google API key; the session fails to start without one
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: LiveModelPreference,
    /// Endpoint override, mainly for tests
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub learner: LearnerContext,
}

impl LiveClientConfig {
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(GEMINI_LIVE_URL)
    }

    /// API key with blank values treated as missing
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl fmt::Debug for LiveClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClientConfig")
            .field("api_key_configured", &self.api_key().is_some())
            .field("model", &self.model)
            .field("url", &self.url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_bounds() {
        assert_eq!(uplink_max_frames(), 4000);
        assert_eq!(downlink_max_frames(), 6000);
        assert_eq!(audio_mime_type(16_000), "audio/pcm;rate=16000");
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = LiveClientConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.api_key().is_none());
        assert_eq!(config.url(), GEMINI_LIVE_URL);
        assert!(!format!("{config:?}").contains("   \""));
    }

    #[test]
    fn test_model_resource_names() {
        assert_eq!(LiveModelPreference::default(), LiveModelPreference::NativeAudio);
        for model in LiveModelPreference::all() {
            assert!(model.resource_name().starts_with("models/"));
        }
        assert_eq!(
            LiveModelPreference::parse("halfCascade"),
            Some(LiveModelPreference::HalfCascade)
        );
    }
}
