//! OpenAI Realtime peer-connection configuration.

use serde::Deserialize;
use std::fmt;

use crate::core::realtime::base::RealtimeModelPreference;
use crate::core::realtime::token_service::TokenServiceConfig;
use crate::core::topic::LearnerContext;

/// Default OpenAI API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// SDP exchange path relative to the API base URL.
pub const REALTIME_CALLS_PATH: &str = "realtime/calls";

/// Label of the JSON events datachannel.
pub const EVENTS_CHANNEL_LABEL: &str = "oai-events";

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Configuration of one peer-connection session.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerClientConfig {
    /// Override for [`OPENAI_API_BASE_URL`]
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub token_service: TokenServiceConfig,
    #[serde(default)]
    pub model: RealtimeModelPreference,
    #[serde(default)]
    pub learner: LearnerContext,
}

impl PeerClientConfig {
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(OPENAI_API_BASE_URL)
    }

    /// `POST` target of the SDP offer
    pub fn calls_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url().trim_end_matches('/'),
            REALTIME_CALLS_PATH
        )
    }
}

impl fmt::Debug for PeerClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerClientConfig")
            .field("api_base_url", &self.api_base_url())
            .field("token_service", &self.token_service)
            .field("model", &self.model)
            .finish()
    }
}

/// Lifecycle of the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    Idle,
    /// Creating the peer connection, tracks and the local offer
    Offering,
    /// Posting the offer and waiting for the answer
    SdpExchanging,
    /// Applying the answer
    IceConnecting,
    Connected,
    Stopping,
    Stopped,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Idle => "idle",
            PeerState::Offering => "offering",
            PeerState::SdpExchanging => "sdp_exchanging",
            PeerState::IceConnecting => "ice_connecting",
            PeerState::Connected => "connected",
            PeerState::Stopping => "stopping",
            PeerState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Stopping | PeerState::Stopped)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
