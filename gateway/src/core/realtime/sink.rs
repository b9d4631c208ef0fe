//! Exclusive, closable event writer handed to a session client.
//!
//! Emits and `close` synchronize on one lock: an emit holds the read side
//! while the consumer callback runs, `close` takes the write side. When
//! `close` returns, no emit is running and none can start, which is what lets
//! `SessionClient::stop` promise silence. Consumer callbacks therefore must
//! not call `close` (or `stop`) on the same sink synchronously.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::base::SessionEvent;

type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Clone)]
pub struct EventSink {
    callback: Arc<RwLock<Option<EventCallback>>>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventSink {
    pub fn new(callback: impl Fn(SessionEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(RwLock::new(Some(Arc::new(callback)))),
        }
    }

    /// Sink forwarding into an unbounded channel consumed by a single task
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    /// Deliver one event. Returns `false` once the sink is closed.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let guard = self.callback.read();
        match guard.as_ref() {
            Some(callback) => {
                callback(event);
                true
            }
            None => {
                tracing::trace!(%event, "Dropping event on closed sink");
                false
            }
        }
    }

    pub fn connected(&self) -> bool {
        self.emit(SessionEvent::Connected)
    }

    pub fn teacher_message(&self, text: impl Into<String>) -> bool {
        self.emit(SessionEvent::TeacherMessage(text.into()))
    }

    pub fn system(&self, text: impl Into<String>) -> bool {
        self.emit(SessionEvent::System(text.into()))
    }

    pub fn error(&self, text: impl Into<String>) -> bool {
        self.emit(SessionEvent::Error(text.into()))
    }

    /// Stop delivering. Waits for an in-flight emit to finish.
    pub fn close(&self) {
        self.callback.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.callback.read().is_none()
    }
}
