//! Gemini Live socket client.
//!
//! # Protocol
//!
//! - Endpoint: [`GEMINI_LIVE_URL`], key in the `x-goog-api-key` header
//! - Uplink: PCM16LE mono at 16 kHz, base64 in `realtimeInput.audio`
//! - Downlink: PCM16LE mono at 24 kHz in `serverContent.modelTurn` inline data
//! - Transcriptions for both directions, surfaced once per completed turn

mod client;
mod config;
mod messages;
mod playback;
mod transcript;
mod uplink;

pub use client::SocketLiveClient;
pub use config::{
    DOWNLINK_MAX_QUEUED_SECONDS, GEMINI_API_KEY_HEADER, GEMINI_LIVE_URL, LiveClientConfig,
    LiveModelPreference, MAX_SCHEDULED_BUFFERS, UPLINK_MAX_QUEUED_SECONDS, audio_mime_type,
    downlink_max_frames, uplink_max_frames,
};
pub use messages::{
    Blob, ClientContent, ClientMessage, Content, GoAway, Part, RealtimeInput, ServerContent,
    ServerMessage, Setup, Transcription,
};
pub use playback::{PlaybackHandle, PlaybackScheduler, PlaybackStats};
pub use transcript::{CompletedTurn, TurnCoalescer};
pub use uplink::{FrameSender, UplinkHandle, UplinkPump};
