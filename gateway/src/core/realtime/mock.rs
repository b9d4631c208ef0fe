//! Scripted session client for demos and tests.
//!
//! Emits `connected`, a greeting for the topic and one system note, paced by
//! tokio timers. It never touches audio devices or the network.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::base::{RealtimeError, RealtimeResult, SessionClient};
use super::sink::EventSink;
use crate::core::topic::Topic;

/// Pause between scripted events
pub const MOCK_STEP_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct MockLiveClient {
    step_delay: Duration,
    muted: bool,
    cancel: CancellationToken,
    sink: Option<EventSink>,
    task: Option<JoinHandle<()>>,
    started: bool,
    stopped: bool,
}

impl Default for MockLiveClient {
    fn default() -> Self {
        Self::new(MOCK_STEP_DELAY)
    }
}

impl MockLiveClient {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            muted: false,
            cancel: CancellationToken::new(),
            sink: None,
            task: None,
            started: false,
            stopped: false,
        }
    }

    pub fn greeting(topic: &Topic) -> String {
        format!(
            "Hi! I'm your English teacher. Let's talk about {}. What do you like about it?",
            topic.title
        )
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl SessionClient for MockLiveClient {
    fn captures_microphone(&self) -> bool {
        false
    }

    fn start(&mut self, topic: Topic, sink: EventSink) -> RealtimeResult<()> {
        if self.started {
            return Err(RealtimeError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RealtimeError::InvalidConfiguration("start must run inside a tokio runtime".to_string())
        })?;
        self.started = true;

        let delay = self.step_delay;
        let cancel = self.cancel.clone();
        let events = sink.clone();
        self.sink = Some(sink);
        self.task = Some(runtime.spawn(async move {
            let script = async {
                tokio::time::sleep(delay).await;
                events.connected();
                tokio::time::sleep(delay).await;
                events.teacher_message(Self::greeting(&topic));
                events.system("Mock session: no audio is sent or received.");
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = script => {}
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(sink) = self.sink.take() {
            sink.system("Mock session stopped.");
            sink.close();
        }
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

impl Drop for MockLiveClient {
    fn drop(&mut self) {
        self.stop();
    }
}
