//! Session model: the single consumer of a live client's events.
//!
//! Owns the transcript, the teacher-ready flag and the stay-awake lease. The
//! lease is taken when a session starts and released on every stop path,
//! including a start that fails.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::realtime::{
    ClientBuilder, EventSink, LiveClient, RealtimeError, RealtimeResult, SessionClient,
    SessionEvent,
};
use crate::core::topic::Topic;

// =============================================================================
// Stay awake
// =============================================================================

/// Keeps the device from sleeping while a session runs
pub trait StayAwake: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Counts outstanding leases; the default for headless hosts
#[derive(Debug, Default)]
pub struct CountingStayAwake {
    active: AtomicUsize,
}

impl CountingStayAwake {
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl StayAwake for CountingStayAwake {
    fn acquire(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Held while a session is in progress; released on drop
pub struct StayAwakeLease {
    target: Arc<dyn StayAwake>,
}

impl StayAwakeLease {
    pub fn acquire(target: Arc<dyn StayAwake>) -> Self {
        target.acquire();
        Self { target }
    }
}

impl Drop for StayAwakeLease {
    fn drop(&mut self) {
        self.target.release();
    }
}

// =============================================================================
// Transcript
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    Teacher,
    System,
    Error,
}

impl TranscriptRole {
    pub fn label(&self) -> &'static str {
        match self {
            TranscriptRole::Teacher => "Teacher",
            TranscriptRole::System => "System",
            TranscriptRole::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: TranscriptRole,
    pub text: String,
}

impl TranscriptEntry {
    fn new(role: TranscriptRole, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
        }
    }
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role.label(), self.text)
    }
}

// =============================================================================
// Session model
// =============================================================================

pub struct SessionModel {
    make_client: ClientBuilder,
    client: LiveClient,
    stay_awake: Arc<dyn StayAwake>,
    show_system_messages: bool,
    messages: Vec<TranscriptEntry>,
    is_teacher_ready: bool,
    is_session_in_progress: bool,
    latest_error_message: Option<String>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    lease: Option<StayAwakeLease>,
}

impl SessionModel {
    /// `make_client` is called once here and again on every `start`, so each
    /// session runs on a client that has never been started.
    pub fn new(
        make_client: ClientBuilder,
        show_system_messages: bool,
        stay_awake: Arc<dyn StayAwake>,
    ) -> Self {
        let client = make_client();
        Self {
            make_client,
            client,
            stay_awake,
            show_system_messages,
            messages: Vec::new(),
            is_teacher_ready: false,
            is_session_in_progress: false,
            latest_error_message: None,
            events: None,
            lease: None,
        }
    }

    pub fn messages(&self) -> &[TranscriptEntry] {
        &self.messages
    }

    pub fn is_teacher_ready(&self) -> bool {
        self.is_teacher_ready
    }

    pub fn is_session_in_progress(&self) -> bool {
        self.is_session_in_progress
    }

    pub fn latest_error_message(&self) -> Option<&str> {
        self.latest_error_message.as_deref()
    }

    pub fn clear_latest_error(&mut self) {
        self.latest_error_message = None;
    }

    pub fn captures_microphone(&self) -> bool {
        self.client.captures_microphone()
    }

    /// Start a session on `topic`.
    ///
    /// A start the client refuses is recorded as an error entry and leaves
    /// the model stopped.
    pub fn start(&mut self, topic: Topic) -> RealtimeResult<()> {
        if self.is_session_in_progress {
            return Err(RealtimeError::AlreadyStarted);
        }
        self.client = (self.make_client)();
        self.messages.clear();
        self.is_teacher_ready = false;
        self.latest_error_message = None;
        self.is_session_in_progress = true;
        self.lease = Some(StayAwakeLease::acquire(self.stay_awake.clone()));

        let (sink, events) = EventSink::channel();
        self.events = Some(events);
        tracing::info!(topic = %topic.id, "Starting session");

        if let Err(e) = self.client.start(topic, sink) {
            tracing::warn!("Session failed to start: {e}");
            self.stop();
            self.record_error(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Stop the client and release the lease. Undelivered events are dropped.
    pub fn stop(&mut self) {
        self.client.stop();
        self.events = None;
        self.is_teacher_ready = false;
        self.latest_error_message = None;
        self.is_session_in_progress = false;
        self.lease = None;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.client.set_muted(muted);
    }

    /// Apply every event already delivered; returns how many were applied
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event and apply it. `None` once the session is over.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events.as_mut()?.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => self.is_teacher_ready = true,
            SessionEvent::TeacherMessage(text) => {
                self.messages
                    .push(TranscriptEntry::new(TranscriptRole::Teacher, text));
            }
            SessionEvent::System(text) => {
                if self.show_system_messages {
                    self.messages
                        .push(TranscriptEntry::new(TranscriptRole::System, text));
                }
            }
            SessionEvent::Error(text) => self.record_error(text),
        }
    }

    fn record_error(&mut self, text: String) {
        self.latest_error_message = Some(text.clone());
        self.messages
            .push(TranscriptEntry::new(TranscriptRole::Error, text));
    }
}

impl Drop for SessionModel {
    fn drop(&mut self) {
        if self.is_session_in_progress {
            self.stop();
        }
    }
}
