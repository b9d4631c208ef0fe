//! OpenAI Realtime peer-connection client.
//!
//! Handshake: fetch a client secret, activate the audio route, build the
//! peer connection, post the SDP offer to `/realtime/calls` with the secret
//! as bearer, apply the answer. After that the session task only relays
//! transport events: datachannel JSON is folded into teacher turns by
//! [`TextTurnAssembler`].

use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{PeerClientConfig, PeerState, SDP_CONTENT_TYPE};
use super::messages::{ClientEvent, ServerEvent, TextTurnAssembler};
use super::transport::{PeerTransport, PeerTransportFactory, TransportEvent};
use crate::core::audio::{AudioSession, RouteObserver, RoutePolicy};
use crate::core::realtime::base::{ClientSecret, RealtimeError, RealtimeResult, SessionClient};
use crate::core::realtime::sink::EventSink;
use crate::core::realtime::token_service::{ClientSecretSource, SecretRequest};
use crate::core::topic::Topic;

struct PeerShared {
    state: Mutex<PeerState>,
    muted: AtomicBool,
    transport: Mutex<Option<Arc<dyn PeerTransport>>>,
    route: Mutex<Option<RouteObserver>>,
}

impl PeerShared {
    fn state(&self) -> PeerState {
        *self.state.lock()
    }

    /// Move to `next` unless the session is already shutting down
    fn advance(&self, next: PeerState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        tracing::debug!(from = %*state, to = %next, "Peer state");
        *state = next;
        true
    }

    fn teardown(&self) {
        let route = self.route.lock().take();
        if let Some(route) = route {
            route.release(true);
        }
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { transport.close().await });
                }
                Err(_) => tracing::debug!("No runtime to close the peer connection on"),
            }
        }
    }
}

pub struct PeerConnectionClient {
    config: PeerClientConfig,
    secrets: Arc<dyn ClientSecretSource>,
    transports: Arc<dyn PeerTransportFactory>,
    audio_session: Arc<dyn AudioSession>,
    http: reqwest::Client,
    shared: Arc<PeerShared>,
    cancel: CancellationToken,
    sink: Option<EventSink>,
    task: Option<JoinHandle<()>>,
    started: bool,
    stopped: bool,
}

impl PeerConnectionClient {
    pub fn new(
        config: PeerClientConfig,
        secrets: Arc<dyn ClientSecretSource>,
        transports: Arc<dyn PeerTransportFactory>,
        audio_session: Arc<dyn AudioSession>,
    ) -> Self {
        Self {
            config,
            secrets,
            transports,
            audio_session,
            http: reqwest::Client::new(),
            shared: Arc::new(PeerShared {
                state: Mutex::new(PeerState::Idle),
                muted: AtomicBool::new(false),
                transport: Mutex::new(None),
                route: Mutex::new(None),
            }),
            cancel: CancellationToken::new(),
            sink: None,
            task: None,
            started: false,
            stopped: false,
        }
    }

    /// Use a preconfigured HTTP client for the SDP exchange
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &PeerClientConfig {
        &self.config
    }

    pub fn state(&self) -> PeerState {
        self.shared.state()
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }
}

impl SessionClient for PeerConnectionClient {
    fn captures_microphone(&self) -> bool {
        self.transports.captures_microphone()
    }

    fn start(&mut self, topic: Topic, sink: EventSink) -> RealtimeResult<()> {
        if self.started {
            return Err(RealtimeError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RealtimeError::InvalidConfiguration("start must run inside a tokio runtime".to_string())
        })?;
        self.started = true;

        let snippet = self.config.learner.render_snippet();
        let session = PeerSession {
            request: SecretRequest {
                mode: self.config.model,
                topic: Some(topic.title.clone()),
                learner: (!snippet.is_empty()).then_some(snippet),
            },
            calls_url: self.config.calls_url(),
            secrets: self.secrets.clone(),
            transports: self.transports.clone(),
            audio_session: self.audio_session.clone(),
            http: self.http.clone(),
            shared: self.shared.clone(),
            sink: sink.clone(),
            cancel: self.cancel.clone(),
        };

        tracing::info!(model = %self.config.model, topic = %topic.id, "Starting WebRTC session");
        self.sink = Some(sink);
        self.task = Some(runtime.spawn(session.run()));
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        *self.shared.state.lock() = PeerState::Stopping;

        if let Some(sink) = self.sink.take() {
            sink.system("WebRTC session stopped.");
            sink.close();
        }
        self.cancel.cancel();
        self.shared.teardown();
        self.task.take();
        *self.shared.state.lock() = PeerState::Stopped;
        tracing::info!("WebRTC session stopped");
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
        if let Some(transport) = self.shared.transport.lock().as_ref() {
            transport.set_microphone_enabled(!muted);
        }
    }
}

impl Drop for PeerConnectionClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Session task
// =============================================================================

struct PeerSession {
    request: SecretRequest,
    calls_url: String,
    secrets: Arc<dyn ClientSecretSource>,
    transports: Arc<dyn PeerTransportFactory>,
    audio_session: Arc<dyn AudioSession>,
    http: reqwest::Client,
    shared: Arc<PeerShared>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl PeerSession {
    async fn run(self) {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.drive() => {}
        }
    }

    async fn drive(&self) {
        self.sink.system("Starting WebRTC session…");

        let secret = match self.secrets.fetch(&self.request).await {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!("Client secret request failed: {e}");
                self.fail(format!("Failed to start realtime session: {e}"));
                return;
            }
        };

        match RoutePolicy::activate(self.audio_session.clone()) {
            Ok(observer) => {
                let mut route = self.shared.route.lock();
                if self.cancel.is_cancelled() {
                    observer.release(true);
                    return;
                }
                *route = Some(observer);
            }
            Err(e) => {
                self.sink.system(format!("Audio session setup warning: {e}"));
            }
        }

        if !self.shared.advance(PeerState::Offering) {
            return;
        }
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let muted = self.shared.muted.load(Ordering::Acquire);
        let transport = match self.transports.create(events_tx, !muted).await {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(format!("Failed to create peer connection: {e}"));
                return;
            }
        };
        let stored = {
            let mut slot = self.shared.transport.lock();
            if self.cancel.is_cancelled() {
                false
            } else {
                *slot = Some(transport.clone());
                true
            }
        };
        if !stored {
            transport.close().await;
            return;
        }
        // Mute may have flipped while the transport was being built
        transport.set_microphone_enabled(!self.shared.muted.load(Ordering::Acquire));

        let offer = match transport.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                self.fail(format!("Failed to create SDP offer: {e}"));
                return;
            }
        };

        if !self.shared.advance(PeerState::SdpExchanging) {
            return;
        }
        self.sink.system("Exchanging SDP with OpenAI…");
        let answer = match self.exchange_sdp(&secret, offer).await {
            Ok(answer) => answer,
            Err(message) => {
                self.fail(message);
                return;
            }
        };
        drop(secret);

        if !self.shared.advance(PeerState::IceConnecting) {
            return;
        }
        if let Err(e) = transport.apply_answer(answer).await {
            self.fail(format!("Failed to set remote description: {e}"));
            return;
        }

        if !self.shared.advance(PeerState::Connected) {
            return;
        }
        self.sink.connected();

        let mut assembler = TextTurnAssembler::new();
        let mut greeted = false;
        let mut ice_connected = false;
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::DataChannelOpen => {
                    self.sink.system("Data channel opened.");
                    if !greeted {
                        greeted = true;
                        self.send_greeting(transport.as_ref()).await;
                    }
                }
                TransportEvent::IceConnected => {
                    if !ice_connected {
                        ice_connected = true;
                        self.sink.system("ICE connected.");
                    }
                }
                TransportEvent::RemoteTrack => {
                    self.sink.system("Received remote track.");
                }
                TransportEvent::Message(text) => match ServerEvent::parse(&text) {
                    Ok(event) => {
                        if let Some(event) = assembler.handle(event) {
                            self.sink.emit(event);
                        }
                    }
                    Err(e) => tracing::debug!("Ignoring datachannel message: {e}"),
                },
                TransportEvent::Failed(reason) => {
                    self.fail(format!("WebRTC connection failed: {reason}"));
                    return;
                }
                TransportEvent::Closed => {
                    self.fail("WebRTC connection closed.".to_string());
                    return;
                }
            }
        }
    }

    async fn send_greeting(&self, transport: &dyn PeerTransport) {
        let sent = match ClientEvent::greeting().to_json() {
            Ok(json) => transport.send_event(json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!("Failed to send response.create: {e}");
            self.sink.error(format!("Failed to request the first response: {e}"));
        }
    }

    /// POST the offer; every failure becomes one human-readable line
    async fn exchange_sdp(&self, secret: &ClientSecret, offer: String) -> Result<String, String> {
        let response = self
            .http
            .post(&self.calls_url)
            .header(AUTHORIZATION, format!("Bearer {}", secret.value))
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer)
            .send()
            .await
            .map_err(|e| format!("SDP exchange failed: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("SDP exchange failed: {e}"))?;
        if !status.is_success() {
            tracing::warn!(status = %status, "OpenAI calls endpoint rejected the offer");
            return Err(format!("OpenAI calls failed ({}): {}", status.as_u16(), body.trim()));
        }
        if body.trim().is_empty() {
            return Err("OpenAI returned an empty SDP answer.".to_string());
        }
        Ok(body)
    }

    /// Report a handshake or connection failure and release everything
    fn fail(&self, message: String) {
        if self.cancel.is_cancelled() {
            return;
        }
        *self.shared.state.lock() = PeerState::Stopped;
        self.sink.error(message);
        self.shared.teardown();
    }
}
