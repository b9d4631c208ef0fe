//! Gemini Live socket client.
//!
//! One WebSocket carries everything: the `setup` handshake, the greeting
//! turn, microphone audio going up and audio plus transcriptions coming down.
//!
//! # Tasks
//!
//! - session task: permission, audio session, connect, then the read loop
//! - writer task: owns the socket's write half, fed by an unbounded channel
//! - uplink sender (see [`UplinkPump`]) and playback actor (see [`PlaybackScheduler`])
//!
//! `stop` closes the event sink first, then cancels the session task and
//! tears the rest down, so no event reaches the consumer after it returns.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::config::{GEMINI_API_KEY_HEADER, LiveClientConfig, downlink_max_frames, uplink_max_frames};
use super::messages::{ClientMessage, ServerContent, ServerMessage, Setup};
use super::playback::{PlaybackHandle, PlaybackScheduler};
use super::transcript::TurnCoalescer;
use super::uplink::{FrameSender, UplinkPump};
use crate::core::audio::{
    AudioBackend, AudioSession, MicrophoneCapture, RouteObserver, RoutePolicy, TapCallback,
    UPLINK_SAMPLE_RATE, UplinkConverter,
};
use crate::core::instructions::{LIVE_SOCKET_INSTRUCTIONS, compose_instructions, greeting_turn};
use crate::core::realtime::base::{RealtimeError, RealtimeResult, SessionClient};
use crate::core::realtime::sink::EventSink;
use crate::core::topic::Topic;
use crate::utils::hex_prefix;

/// Bytes of an undecodable binary frame shown in the diagnostic note
const BINARY_PREFIX_BYTES: usize = 16;

// =============================================================================
// Writer
// =============================================================================

enum Outbound {
    Text {
        json: String,
        ack: Option<oneshot::Sender<RealtimeResult<()>>>,
    },
    Pong(Bytes),
    /// Close with "going away" and end the writer
    Close,
}

async fn run_writer<S>(
    mut write: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    failures: FailureReporter,
) where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Text { json, ack } => {
                let result = write
                    .send(Message::Text(json.into()))
                    .await
                    .map_err(|e| RealtimeError::TransportFailure(e.to_string()));
                if let Err(e) = &result {
                    tracing::warn!("Gemini Live send failed: {e}");
                    failures.fail(format!("Gemini Live send failed: {e}"));
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            Outbound::Pong(data) => {
                if let Err(e) = write.send(Message::Pong(data)).await {
                    tracing::debug!("Failed to send pong: {e}");
                }
            }
            Outbound::Close => {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: "going away".into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!("Failed to send close frame: {e}");
                }
                break;
            }
        }
    }
}

/// Uplink audio goes through the writer; the ack resolves once the frame is
/// written, which keeps one audio message in flight.
struct SocketFrameSender {
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl FrameSender for SocketFrameSender {
    async fn send_audio(&self, pcm: Bytes, sample_rate: u32) -> RealtimeResult<()> {
        let json = ClientMessage::audio(&pcm, sample_rate).to_json()?;
        let (ack, done) = oneshot::channel();
        self.outbound
            .send(Outbound::Text {
                json,
                ack: Some(ack),
            })
            .map_err(|_| RealtimeError::NotConnected)?;
        done.await.map_err(|_| RealtimeError::NotConnected)?
    }
}

// =============================================================================
// Live resources
// =============================================================================

/// Everything that exists only while the socket is open
struct LiveResources {
    outbound: mpsc::UnboundedSender<Outbound>,
    uplink: UplinkPump,
    playback: PlaybackHandle,
    microphone: Option<Box<dyn MicrophoneCapture>>,
    setup_complete: bool,
}

impl LiveResources {
    fn send(&self, message: ClientMessage) -> RealtimeResult<()> {
        let json = message.to_json()?;
        self.outbound
            .send(Outbound::Text { json, ack: None })
            .map_err(|_| RealtimeError::NotConnected)
    }

    fn shutdown(mut self, say_goodbye: bool) {
        if say_goodbye && self.setup_complete {
            let _ = self.send(ClientMessage::audio_stream_end());
        }
        let _ = self.outbound.send(Outbound::Close);

        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        self.uplink.stop();
        self.playback.stop();
    }
}

struct Shared {
    backend: Arc<dyn AudioBackend>,
    muted: AtomicBool,
    live: Mutex<Option<LiveResources>>,
    route: Mutex<Option<RouteObserver>>,
    /// Set by the first terminal failure of the session
    failed: AtomicBool,
}

impl Shared {
    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Open (once) and start the microphone unless muted
    fn start_microphone(&self) -> RealtimeResult<()> {
        let mut guard = self.live.lock();
        let Some(live) = guard.as_mut() else {
            return Ok(());
        };
        if self.is_muted() || !live.setup_complete {
            return Ok(());
        }

        if live.microphone.is_none() {
            let uplink = live.uplink.handle();
            let mut converter = UplinkConverter::new(UPLINK_SAMPLE_RATE);
            let tap: TapCallback = Box::new(move |buffer| {
                if let Some(chunk) = converter.convert(&buffer) {
                    uplink.push(chunk);
                }
            });
            live.microphone = Some(self.backend.open_microphone(tap)?);
        }

        if let Some(microphone) = live.microphone.as_mut() {
            microphone.start()?;
        }
        Ok(())
    }

    fn teardown(&self, say_goodbye: bool) {
        let live = self.live.lock().take();
        if let Some(live) = live {
            live.shutdown(say_goodbye);
        }
        let route = self.route.lock().take();
        if let Some(route) = route {
            route.release(true);
        }
    }
}

/// Turns the first terminal failure of a session into one `error` event plus
/// teardown. Later failures (a dead socket seen by both halves) are only logged.
#[derive(Clone)]
struct FailureReporter {
    shared: Arc<Shared>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl FailureReporter {
    fn fail(&self, message: String) {
        if self.cancel.is_cancelled() || self.shared.failed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Ignoring follow-up failure: {message}");
            return;
        }
        self.sink.error(message);
        self.shared.teardown(false);
    }
}

// =============================================================================
// Client
// =============================================================================

pub struct SocketLiveClient {
    config: LiveClientConfig,
    audio_session: Arc<dyn AudioSession>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    sink: Option<EventSink>,
    task: Option<JoinHandle<()>>,
    started: bool,
    stopped: bool,
}

impl SocketLiveClient {
    pub fn new(
        config: LiveClientConfig,
        backend: Arc<dyn AudioBackend>,
        audio_session: Arc<dyn AudioSession>,
    ) -> Self {
        Self {
            config,
            audio_session,
            shared: Arc::new(Shared {
                backend,
                muted: AtomicBool::new(false),
                live: Mutex::new(None),
                route: Mutex::new(None),
                failed: AtomicBool::new(false),
            }),
            cancel: CancellationToken::new(),
            sink: None,
            task: None,
            started: false,
            stopped: false,
        }
    }

    pub fn config(&self) -> &LiveClientConfig {
        &self.config
    }

    pub fn is_muted(&self) -> bool {
        self.shared.is_muted()
    }

    fn system_instruction(&self, topic: &Topic) -> String {
        let snippet = self.config.learner.render_snippet();
        compose_instructions(LIVE_SOCKET_INSTRUCTIONS, Some(&snippet), Some(&topic.title))
    }
}

impl SessionClient for SocketLiveClient {
    fn captures_microphone(&self) -> bool {
        true
    }

    fn start(&mut self, topic: Topic, sink: EventSink) -> RealtimeResult<()> {
        if self.started {
            return Err(RealtimeError::AlreadyStarted);
        }
        let Some(api_key) = self.config.api_key() else {
            return Err(RealtimeError::ConfigurationMissing(
                "Missing Google API key. Set GOOGLE_API_KEY to use Gemini Live.".to_string(),
            ));
        };
        let api_key = HeaderValue::from_str(api_key)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("Google API key: {e}")))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RealtimeError::InvalidConfiguration("start must run inside a tokio runtime".to_string())
        })?;
        self.started = true;

        let session = SocketSession {
            url: self.config.url().to_string(),
            api_key,
            model: self.config.model.resource_name().to_string(),
            system_instruction: self.system_instruction(&topic),
            topic,
            shared: self.shared.clone(),
            audio_session: self.audio_session.clone(),
            sink: sink.clone(),
            cancel: self.cancel.clone(),
            coalescer: TurnCoalescer::new(),
        };

        tracing::info!(model = %self.config.model, "Starting Gemini Live session");
        self.sink = Some(sink);
        self.task = Some(runtime.spawn(session.run()));
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(sink) = self.sink.take() {
            sink.system("Gemini Live session stopped.");
            sink.close();
        }
        self.cancel.cancel();
        self.shared.teardown(true);
        // The session task exits on cancellation; the writer drains the goodbye
        self.task.take();
        tracing::info!("Gemini Live session stopped");
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);

        let resume = {
            let mut guard = self.shared.live.lock();
            let Some(live) = guard.as_mut() else {
                return;
            };
            live.uplink.set_muted(muted);
            if muted {
                if let Some(microphone) = live.microphone.as_mut() {
                    microphone.pause();
                }
                if live.setup_complete {
                    let _ = live.send(ClientMessage::audio_stream_end());
                }
                false
            } else {
                live.setup_complete
            }
        };

        if resume
            && let Err(e) = self.shared.start_microphone()
            && let Some(sink) = &self.sink
        {
            sink.error(format!("Failed to start microphone capture: {e}"));
        }
    }
}

impl Drop for SocketLiveClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Session task
// =============================================================================

struct SocketSession {
    url: String,
    api_key: HeaderValue,
    model: String,
    system_instruction: String,
    topic: Topic,
    shared: Arc<Shared>,
    audio_session: Arc<dyn AudioSession>,
    sink: EventSink,
    cancel: CancellationToken,
    coalescer: TurnCoalescer,
}

impl SocketSession {
    async fn run(mut self) {
        self.sink.system("Starting Gemini Live session…");

        let backend = self.shared.backend.clone();
        let granted = tokio::select! {
            _ = self.cancel.cancelled() => return,
            granted = backend.request_microphone_permission() => granted,
        };
        if !granted {
            self.sink.error(
                "Microphone permission denied. Enable microphone access to use Gemini Live audio.",
            );
            return;
        }

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
                self.sink
                    .error(format!("Failed to configure audio session: {e}"));
            }
        }

        let mut request = match self.url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                self.sink
                    .error(format!("Invalid Gemini Live WebSocket URL: {e}"));
                return;
            }
        };
        request
            .headers_mut()
            .insert(GEMINI_API_KEY_HEADER, self.api_key.clone());

        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(request) => result,
        };
        let (ws_stream, response) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!("Gemini Live connection failed: {e}");
                self.fail(format!("Gemini Live connection failed: {e}"));
                return;
            }
        };
        tracing::info!(status = %response.status(), "Connected to Gemini Live");

        let (write, mut read) = ws_stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(write, outbound_rx, self.failures()));

        let uplink = UplinkPump::spawn(
            uplink_max_frames(),
            Arc::new(SocketFrameSender {
                outbound: outbound.clone(),
            }),
        );
        uplink.set_muted(self.shared.is_muted());
        let (playback, _playback_task) = PlaybackScheduler::spawn(
            self.shared.backend.clone(),
            self.sink.clone(),
            downlink_max_frames(),
        );

        let resources = LiveResources {
            outbound,
            uplink,
            playback: playback.clone(),
            microphone: None,
            setup_complete: false,
        };
        if let Err(e) = resources.send(ClientMessage::Setup(Setup::new(
            &self.model,
            std::mem::take(&mut self.system_instruction),
        ))) {
            self.sink.error(format!("Gemini Live encoding failed: {e}"));
            resources.shutdown(false);
            return;
        }
        {
            let mut live = self.shared.live.lock();
            if self.cancel.is_cancelled() {
                drop(live);
                resources.shutdown(true);
                return;
            }
            *live = Some(resources);
        }

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = read.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str(), &playback),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_text(text, &playback),
                    Err(_) => {
                        self.sink.system(format!(
                            "Gemini Live received non-UTF8 binary frame ({} bytes, hex prefix: {}).",
                            data.len(),
                            hex_prefix(&data, BINARY_PREFIX_BYTES)
                        ));
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Some(live) = self.shared.live.lock().as_ref() {
                        let _ = live.outbound.send(Outbound::Pong(data));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let detail = frame
                        .map(|f| format!(" ({}: {})", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_default();
                    tracing::info!("Gemini Live socket closed by server{detail}");
                    self.fail(format!("Gemini Live socket closed by server{detail}."));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Gemini Live socket error: {e}");
                    self.fail(format!("Gemini Live socket error: {e}"));
                    break;
                }
                None => {
                    self.fail("Gemini Live socket closed.".to_string());
                    break;
                }
            }
        }
    }

    /// Report a terminal failure and release everything
    fn fail(&self, message: String) {
        self.failures().fail(message);
    }

    fn failures(&self) -> FailureReporter {
        FailureReporter {
            shared: self.shared.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
        }
    }

    fn handle_text(&mut self, text: &str, playback: &PlaybackHandle) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("{e}");
                self.sink
                    .system("Gemini Live: received unparseable server message.");
                return;
            }
        };

        if message.is_setup_complete() {
            self.on_setup_complete();
            return;
        }

        if let Some(go_away) = message.go_away {
            let time_left = go_away.time_left.as_deref().unwrap_or("unknown");
            tracing::info!(time_left, "Gemini Live goAway");
            self.sink.system(format!(
                "Gemini Live: server will disconnect soon (timeLeft: {time_left})."
            ));
            return;
        }

        if let Some(content) = message.server_content {
            self.on_server_content(&content, playback);
        }
    }

    fn on_setup_complete(&mut self) {
        {
            let mut guard = self.shared.live.lock();
            let Some(live) = guard.as_mut() else {
                return;
            };
            live.setup_complete = true;
            live.uplink.set_ready(true);
        }

        self.sink.connected();
        self.sink.system("Gemini Live setup complete.");

        let greeting = ClientMessage::user_turn(greeting_turn(&self.topic.title));
        let sent = match self.shared.live.lock().as_ref() {
            Some(live) => live.send(greeting),
            None => Err(RealtimeError::NotConnected),
        };
        if let Err(e) = sent {
            tracing::warn!("Failed to send greeting turn: {e}");
            self.fail(format!("Gemini Live send failed: {e}"));
            return;
        }

        if !self.shared.is_muted()
            && let Err(e) = self.shared.start_microphone()
        {
            self.sink
                .error(format!("Failed to start microphone capture: {e}"));
        }
    }

    fn on_server_content(&mut self, content: &ServerContent, playback: &PlaybackHandle) {
        if content.is_interrupted() {
            playback.interrupt();
        }

        for blob in content.audio_parts() {
            match blob.decode() {
                Ok(pcm) => playback.enqueue(Bytes::from(pcm)),
                Err(e) => tracing::debug!("Skipping audio part: {e}"),
            }
        }

        if let Some(turn) = self.coalescer.absorb(content) {
            if let Some(learner) = turn.learner {
                self.sink.system(format!("You: {learner}"));
            }
            if let Some(teacher) = turn.teacher {
                self.sink.teacher_message(teacher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::NullAudioBackend;
    use crate::core::realtime::base::SessionEvent;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Write half of a socket the peer has already dropped
    struct ClosedSocket;

    impl futures_util::Sink<Message> for ClosedSocket {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(tungstenite::Error::ConnectionClosed))
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Err(tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(tungstenite::Error::ConnectionClosed))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            backend: Arc::new(NullAudioBackend),
            muted: AtomicBool::new(false),
            live: Mutex::new(None),
            route: Mutex::new(None),
            failed: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn test_first_write_failure_reported_once() {
        let (sink, mut events) = EventSink::channel();
        let failures = FailureReporter {
            shared: shared(),
            sink,
            cancel: CancellationToken::new(),
        };
        let broken = ClosedSocket;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut acks = Vec::new();
        for json in ["{\"a\":1}", "{\"b\":2}"] {
            let (ack, done) = oneshot::channel();
            let queued = tx.send(Outbound::Text {
                json: json.to_string(),
                ack: Some(ack),
            });
            assert!(queued.is_ok());
            acks.push(done);
        }
        drop(tx);
        run_writer(broken, rx, failures.clone()).await;

        for done in acks {
            assert!(matches!(
                done.await.unwrap(),
                Err(RealtimeError::TransportFailure(_))
            ));
        }
        match events.try_recv() {
            Ok(SessionEvent::Error(text)) => {
                assert!(text.starts_with("Gemini Live send failed:"), "{text}")
            }
            other => panic!("expected one error, got {other:?}"),
        }
        assert!(events.try_recv().is_err());

        // A read-side failure after that stays quiet
        failures.fail("Gemini Live socket closed.".to_string());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_after_stop_is_silent() {
        let (sink, mut events) = EventSink::channel();
        let cancel = CancellationToken::new();
        let failures = FailureReporter {
            shared: shared(),
            sink,
            cancel: cancel.clone(),
        };
        cancel.cancel();
        failures.fail("Gemini Live send failed: closed".to_string());
        assert!(events.try_recv().is_err());
    }
}
