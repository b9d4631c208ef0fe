//! OpenAI Realtime peer-connection client.
//!
//! # Protocol
//!
//! - Client secret minted by the token service, used once as SDP bearer
//! - `POST {base}/realtime/calls` with the offer (`application/sdp`),
//!   the response body is the answer
//! - One local audio track, one remote audio track
//! - JSON events on the reliable ordered `oai-events` datachannel
//!
//! # Audio Format
//!
//! The transport negotiates PCMU (G.711 μ-law, 8 kHz mono). Remote audio is
//! upsampled to 24 kHz for playback.

mod client;
mod config;
mod messages;
mod transport;
#[cfg(feature = "webrtc")]
mod webrtc_transport;

pub use client::PeerConnectionClient;
pub use config::{
    EVENTS_CHANNEL_LABEL, OPENAI_API_BASE_URL, PeerClientConfig, PeerState, REALTIME_CALLS_PATH,
    SDP_CONTENT_TYPE,
};
pub use messages::{ClientEvent, ResponseParams, ServerEvent, TextTurnAssembler};
pub use transport::{
    PeerTransport, PeerTransportFactory, TransportEvent, TransportEvents,
    UnsupportedTransportFactory, default_transport_factory,
};
#[cfg(feature = "webrtc")]
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
