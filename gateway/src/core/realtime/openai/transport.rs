//! Peer transport seam.
//!
//! The client drives the handshake and the events datachannel through
//! [`PeerTransport`]; media tracks stay inside the transport. The default
//! implementation is webrtc-rs (feature `webrtc`), tests script their own.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::audio::AudioBackend;
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// Asynchronous notifications from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The `oai-events` datachannel is open
    DataChannelOpen,
    /// One text message from the datachannel
    Message(String),
    IceConnected,
    /// Remote audio arrived and is being played
    RemoteTrack,
    /// Unrecoverable connection failure
    Failed(String),
    Closed,
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// One peer connection with a local audio sender and the events channel
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the offer, set it as local description and return its SDP once
    /// ICE gathering is done.
    async fn create_offer(&self) -> RealtimeResult<String>;

    async fn apply_answer(&self, sdp: String) -> RealtimeResult<()>;

    /// Send one JSON event on the datachannel
    async fn send_event(&self, json: String) -> RealtimeResult<()>;

    /// Enable or disable the local audio track without renegotiating
    fn set_microphone_enabled(&self, enabled: bool);

    async fn close(&self);
}

/// Creates one transport per session attempt
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    fn captures_microphone(&self) -> bool;

    async fn create(
        &self,
        events: TransportEvents,
        microphone_enabled: bool,
    ) -> RealtimeResult<Arc<dyn PeerTransport>>;
}

/// Factory used when the crate is built without a WebRTC stack
#[derive(Debug, Default)]
pub struct UnsupportedTransportFactory;

#[async_trait]
impl PeerTransportFactory for UnsupportedTransportFactory {
    fn captures_microphone(&self) -> bool {
        false
    }

    async fn create(
        &self,
        _events: TransportEvents,
        _microphone_enabled: bool,
    ) -> RealtimeResult<Arc<dyn PeerTransport>> {
        Err(RealtimeError::InvalidConfiguration(
            "WebRTC support is not compiled in (enable the `webrtc` feature)".to_string(),
        ))
    }
}

/// The platform peer transport for `backend`
pub fn default_transport_factory(backend: Arc<dyn AudioBackend>) -> Arc<dyn PeerTransportFactory> {
    #[cfg(feature = "webrtc")]
    {
        Arc::new(super::webrtc_transport::WebRtcTransportFactory::new(backend))
    }
    #[cfg(not(feature = "webrtc"))]
    {
        let _ = backend;
        Arc::new(UnsupportedTransportFactory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_factory_refuses() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = UnsupportedTransportFactory.create(tx, true).await;
        assert!(matches!(result, Err(RealtimeError::InvalidConfiguration(_))));
        assert!(!UnsupportedTransportFactory.captures_microphone());
    }
}
