//! Downlink playback actor.
//!
//! Received PCM goes into a bounded head-drop queue; at most
//! [`MAX_SCHEDULED_BUFFERS`] buffers are handed to the speaker at once. Buffer
//! completions are posted back to the same task, so every counter has a single
//! owner. Interruption bumps a generation number so completions of flushed
//! buffers are ignored.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::MAX_SCHEDULED_BUFFERS;
use crate::core::audio::pcm::decode_pcm16le;
use crate::core::audio::{AudioBackend, DOWNLINK_SAMPLE_RATE, FrameQueue, SpeakerOutput};
use crate::core::realtime::sink::EventSink;

/// Snapshot of the playback counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStats {
    pub queued_frames: usize,
    pub scheduled_buffers: usize,
    pub dropped_frames: u64,
    pub speaker_open: bool,
}

enum PlaybackCommand {
    Enqueue(Bytes),
    Completed { generation: u64 },
    Interrupt,
    Stats(oneshot::Sender<PlaybackStats>),
    Stop,
}

/// Sending side of the playback actor
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: mpsc::UnboundedSender<PlaybackCommand>,
}

impl PlaybackHandle {
    /// Queue PCM16LE mono audio at the downlink rate
    pub fn enqueue(&self, pcm: Bytes) {
        let _ = self.tx.send(PlaybackCommand::Enqueue(pcm));
    }

    /// Discard queued and scheduled audio
    pub fn interrupt(&self) {
        let _ = self.tx.send(PlaybackCommand::Interrupt);
    }

    pub fn stop(&self) {
        let _ = self.tx.send(PlaybackCommand::Stop);
    }

    /// `None` once the actor has stopped
    pub async fn stats(&self) -> Option<PlaybackStats> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(PlaybackCommand::Stats(tx)).ok()?;
        rx.await.ok()
    }
}

pub struct PlaybackScheduler {
    backend: Arc<dyn AudioBackend>,
    sink: EventSink,
    queue: FrameQueue,
    speaker: Option<Box<dyn SpeakerOutput>>,
    scheduled: usize,
    generation: u64,
    output_failed: bool,
    completions: mpsc::WeakUnboundedSender<PlaybackCommand>,
}

impl PlaybackScheduler {
    /// Spawn the actor. The speaker is opened lazily on the first audio.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        sink: EventSink,
        max_frames: usize,
    ) -> (PlaybackHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            backend,
            sink,
            queue: FrameQueue::new(max_frames),
            speaker: None,
            scheduled: 0,
            generation: 0,
            output_failed: false,
            completions: tx.downgrade(),
        };

        let task = tokio::spawn(scheduler.run(rx));
        (PlaybackHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlaybackCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                PlaybackCommand::Enqueue(pcm) => self.enqueue(pcm),
                PlaybackCommand::Completed { generation } => {
                    if generation == self.generation {
                        self.scheduled = self.scheduled.saturating_sub(1);
                        self.drain();
                    }
                }
                PlaybackCommand::Interrupt => self.interrupt(),
                PlaybackCommand::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                PlaybackCommand::Stop => break,
            }
        }

        self.shutdown();
    }

    fn enqueue(&mut self, pcm: Bytes) {
        if pcm.is_empty() {
            return;
        }
        let dropped = self.queue.push(pcm);
        if dropped > 0 {
            tracing::trace!(frames = dropped, "Playback queue full, dropped oldest audio");
        }
        self.drain();
    }

    fn ensure_speaker(&mut self) -> bool {
        if self.speaker.is_some() {
            return true;
        }
        if self.output_failed {
            return false;
        }

        let opened = self
            .backend
            .open_speaker(DOWNLINK_SAMPLE_RATE)
            .and_then(|mut speaker| speaker.play().map(|_| speaker));
        match opened {
            Ok(speaker) => {
                tracing::debug!(sample_rate = DOWNLINK_SAMPLE_RATE, "Opened playback output");
                self.speaker = Some(speaker);
                true
            }
            Err(e) => {
                self.output_failed = true;
                self.sink
                    .error(format!("Failed to start output audio engine: {e}"));
                false
            }
        }
    }

    fn drain(&mut self) {
        if !self.ensure_speaker() {
            return;
        }
        let generation = self.generation;
        let Some(speaker) = self.speaker.as_mut() else {
            return;
        };
        if !speaker.is_playing() {
            return;
        }

        while self.scheduled < MAX_SCHEDULED_BUFFERS {
            let Some(pcm) = self.queue.pop_front() else {
                break;
            };
            let samples = decode_pcm16le(&pcm);
            if samples.is_empty() {
                continue;
            }

            self.scheduled += 1;
            let completions = self.completions.clone();
            let done = Box::new(move || {
                if let Some(tx) = completions.upgrade() {
                    let _ = tx.send(PlaybackCommand::Completed { generation });
                }
            });
            if let Err(e) = speaker.schedule(samples, done) {
                tracing::warn!("Failed to schedule playback buffer: {e}");
                self.scheduled -= 1;
            }
        }
    }

    fn interrupt(&mut self) {
        self.queue.clear();
        self.scheduled = 0;
        self.generation += 1;

        if let Some(speaker) = self.speaker.as_mut() {
            speaker.stop();
            if let Err(e) = speaker.play() {
                tracing::warn!("Failed to restart playback after interruption: {e}");
            }
        }
        tracing::debug!(generation = self.generation, "Playback interrupted");
    }

    fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            queued_frames: self.queue.queued_frames(),
            scheduled_buffers: self.scheduled,
            dropped_frames: self.queue.dropped_frames(),
            speaker_open: self.speaker.is_some(),
        }
    }

    fn shutdown(&mut self) {
        self.queue.clear();
        self.scheduled = 0;
        if let Some(mut speaker) = self.speaker.take() {
            speaker.stop();
        }
    }
}
