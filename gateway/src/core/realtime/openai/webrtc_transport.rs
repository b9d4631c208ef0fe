//! webrtc-rs peer transport.
//!
//! Audio is negotiated as PCMU (G.711 μ-law, 8 kHz mono). The microphone is
//! resampled to 8 kHz and written as 20 ms samples; remote audio is decoded,
//! upsampled to the playback rate and scheduled on the speaker.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_PCMU, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::config::EVENTS_CHANNEL_LABEL;
use super::transport::{PeerTransport, PeerTransportFactory, TransportEvent, TransportEvents};
use crate::core::audio::g711::{self, G711_SAMPLE_RATE};
use crate::core::audio::pcm::{decode_pcm16le, f32_to_i16, i16_to_f32};
use crate::core::audio::{
    AudioBackend, DOWNLINK_SAMPLE_RATE, LinearResampler, MicrophoneCapture, TapCallback,
    UplinkConverter,
};
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// Static payload type of PCMU
const PCMU_PAYLOAD_TYPE: u8 = 0;

fn pcmu_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_PCMU.to_owned(),
        clock_rate: G711_SAMPLE_RATE,
        channels: 1,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

fn transport_error(context: &str, e: webrtc::Error) -> RealtimeError {
    RealtimeError::TransportFailure(format!("{context}: {e}"))
}

pub struct WebRtcTransportFactory {
    backend: Arc<dyn AudioBackend>,
}

impl WebRtcTransportFactory {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PeerTransportFactory for WebRtcTransportFactory {
    fn captures_microphone(&self) -> bool {
        true
    }

    async fn create(
        &self,
        events: TransportEvents,
        microphone_enabled: bool,
    ) -> RealtimeResult<Arc<dyn PeerTransport>> {
        let transport = WebRtcTransport::connect(self.backend.clone(), events, microphone_enabled)
            .await?;
        Ok(Arc::new(transport))
    }
}

pub struct WebRtcTransport {
    peer: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    microphone_enabled: Arc<AtomicBool>,
    microphone: Mutex<Option<Box<dyn MicrophoneCapture>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WebRtcTransport {
    async fn connect(
        backend: Arc<dyn AudioBackend>,
        events: TransportEvents,
        microphone_enabled: bool,
    ) -> RealtimeResult<Self> {
        let mut media = MediaEngine::default();
        media
            .register_codec(
                RTCRtpCodecParameters {
                    capability: pcmu_capability(),
                    payload_type: PCMU_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| transport_error("Failed to register PCMU", e))?;
        let registry = register_default_interceptors(Registry::new(), &mut media)
            .map_err(|e| transport_error("Failed to register interceptors", e))?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| transport_error("Failed to create peer connection", e))?,
        );

        let mut tasks = Vec::new();

        // Local audio sender
        let track = Arc::new(TrackLocalStaticSample::new(
            pcmu_capability(),
            "audio".to_owned(),
            "tutor-gateway".to_owned(),
        ));
        let sender = peer
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| transport_error("Failed to add audio track", e))?;
        tasks.push(tokio::spawn(async move {
            let mut rtcp = vec![0u8; 1500];
            while sender.read(&mut rtcp).await.is_ok() {}
        }));

        let enabled = Arc::new(AtomicBool::new(microphone_enabled));
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Bytes>();
        tasks.push(tokio::spawn(async move {
            while let Some(payload) = frames_rx.recv().await {
                let duration =
                    Duration::from_secs_f64(payload.len() as f64 / f64::from(G711_SAMPLE_RATE));
                let sample = Sample {
                    data: payload,
                    duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::debug!("Dropping microphone sample: {e}");
                }
            }
        }));

        let tap_enabled = enabled.clone();
        let mut converter = UplinkConverter::new(G711_SAMPLE_RATE);
        let tap: TapCallback = Box::new(move |buffer| {
            if !tap_enabled.load(Ordering::Acquire) {
                return;
            }
            if let Some(chunk) = converter.convert(&buffer)
                && chunk.sample_rate == G711_SAMPLE_RATE
            {
                let _ = frames_tx.send(Bytes::from(g711::encode(&decode_pcm16le(&chunk.pcm))));
            }
        });
        let mut microphone = backend.open_microphone(tap)?;
        if microphone_enabled {
            microphone.start()?;
        }

        // Events channel
        let channel = peer
            .create_data_channel(
                EVENTS_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| transport_error("Failed to create datachannel", e))?;

        let open_events = events.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = open_events.send(TransportEvent::DataChannelOpen);
            })
        }));

        let message_events = events.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let events = message_events.clone();
            Box::pin(async move {
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::Message(text));
                    }
                    Err(_) => tracing::debug!(
                        bytes = message.data.len(),
                        "Ignoring non-UTF8 datachannel message"
                    ),
                }
            })
        }));

        let ice_events = events.clone();
        peer.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let events = ice_events.clone();
            Box::pin(async move {
                tracing::debug!(state = %state, "ICE connection state changed");
                let event = match state {
                    RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                        Some(TransportEvent::IceConnected)
                    }
                    RTCIceConnectionState::Failed => {
                        Some(TransportEvent::Failed("ICE connection failed.".to_string()))
                    }
                    RTCIceConnectionState::Closed => Some(TransportEvent::Closed),
                    _ => None,
                };
                if let Some(event) = event {
                    let _ = events.send(event);
                }
            })
        }));

        let track_events = events;
        let track_backend = backend;
        peer.on_track(Box::new(
            move |remote: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                let backend = track_backend.clone();
                Box::pin(async move {
                    let _ = events.send(TransportEvent::RemoteTrack);
                    tokio::spawn(play_remote_track(remote, backend));
                })
            },
        ));

        Ok(Self {
            peer,
            channel,
            microphone_enabled: enabled,
            microphone: Mutex::new(Some(microphone)),
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }
}

/// Decode remote PCMU and play it until the track ends
async fn play_remote_track(remote: Arc<TrackRemote>, backend: Arc<dyn AudioBackend>) {
    let mut speaker = match backend.open_speaker(DOWNLINK_SAMPLE_RATE) {
        Ok(speaker) => speaker,
        Err(e) => {
            tracing::warn!("Failed to open speaker for remote track: {e}");
            return;
        }
    };
    if let Err(e) = speaker.play() {
        tracing::warn!("Failed to start speaker: {e}");
        return;
    }
    let mut resampler = match LinearResampler::new(G711_SAMPLE_RATE, DOWNLINK_SAMPLE_RATE) {
        Ok(resampler) => resampler,
        Err(e) => {
            tracing::warn!("Failed to build downlink resampler: {e}");
            return;
        }
    };

    while let Ok((packet, _)) = remote.read_rtp().await {
        if packet.payload.is_empty() {
            continue;
        }
        let decoded = i16_to_f32(&g711::decode(&packet.payload));
        let samples = f32_to_i16(&resampler.process(&decoded));
        if let Err(e) = speaker.schedule(samples, Box::new(|| {})) {
            tracing::debug!("Dropping remote audio: {e}");
        }
    }
    speaker.stop();
    tracing::debug!("Remote track ended");
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> RealtimeResult<String> {
        let offer = self
            .peer
            .create_offer(None)
            .await
            .map_err(|e| transport_error("Failed to create offer", e))?;
        let mut gathered = self.peer.gathering_complete_promise().await;
        self.peer
            .set_local_description(offer)
            .await
            .map_err(|e| transport_error("Failed to set local description", e))?;
        let _ = gathered.recv().await;

        self.peer
            .local_description()
            .await
            .map(|description| description.sdp)
            .ok_or_else(|| RealtimeError::ProtocolViolation("missing local description".to_string()))
    }

    async fn apply_answer(&self, sdp: String) -> RealtimeResult<()> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| RealtimeError::ProtocolViolation(e.to_string()))?;
        self.peer
            .set_remote_description(answer)
            .await
            .map_err(|e| RealtimeError::ProtocolViolation(e.to_string()))
    }

    async fn send_event(&self, json: String) -> RealtimeResult<()> {
        self.channel
            .send_text(json)
            .await
            .map(|_| ())
            .map_err(|e| transport_error("Datachannel send failed", e))
    }

    fn set_microphone_enabled(&self, enabled: bool) {
        self.microphone_enabled.store(enabled, Ordering::Release);
        if let Some(microphone) = self.microphone.lock().as_mut() {
            if enabled {
                if let Err(e) = microphone.start() {
                    tracing::warn!("Failed to resume microphone: {e}");
                }
            } else {
                microphone.pause();
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut microphone) = self.microphone.lock().take() {
            microphone.stop();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Datachannel close failed: {e}");
        }
        if let Err(e) = self.peer.close().await {
            tracing::debug!("Peer connection close failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcmu_capability() {
        let capability = pcmu_capability();
        assert_eq!(capability.mime_type, MIME_TYPE_PCMU);
        assert_eq!(capability.clock_rate, 8_000);
        assert_eq!(capability.channels, 1);
    }
}
