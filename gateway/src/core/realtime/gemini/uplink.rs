//! Microphone uplink: bounded head-drop queue drained by a single sender.
//!
//! The capture callback pushes converted chunks from the audio thread; one
//! tokio task pops them in capture order and awaits each send before taking
//! the next, so at most one audio message is ever in flight. When the socket
//! is slower than the microphone the oldest audio is dropped.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::core::audio::resample::ConvertedChunk;
use crate::core::audio::{FrameQueue, UPLINK_SAMPLE_RATE};
use crate::core::realtime::base::RealtimeResult;

/// Destination of uplink audio. `send_audio` resolves once the message has
/// been handed to the transport.
#[async_trait]
pub trait FrameSender: Send + Sync {
    async fn send_audio(&self, pcm: Bytes, sample_rate: u32) -> RealtimeResult<()>;
}

struct UplinkShared {
    queue: Mutex<FrameQueue>,
    sample_rate: AtomicU32,
    wake: Notify,
    stopped: AtomicBool,
    muted: AtomicBool,
    ready: AtomicBool,
}

impl UplinkShared {
    fn can_drain(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
            && !self.muted.load(Ordering::Acquire)
            && self.ready.load(Ordering::Acquire)
    }
}

/// Cheap handle used by the capture callback
#[derive(Clone)]
pub struct UplinkHandle {
    shared: Arc<UplinkShared>,
}

impl UplinkHandle {
    /// Queue one chunk. Returns `false` when the gates refuse audio.
    pub fn push(&self, chunk: ConvertedChunk) -> bool {
        if !self.shared.can_drain() {
            return false;
        }

        let dropped = self.shared.queue.lock().push(chunk.pcm);
        if dropped > 0 {
            tracing::trace!(frames = dropped, "Uplink queue full, dropped oldest audio");
        }
        self.shared
            .sample_rate
            .store(chunk.sample_rate, Ordering::Release);
        self.shared.wake.notify_one();
        true
    }

    pub fn queued_frames(&self) -> usize {
        self.shared.queue.lock().queued_frames()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.shared.queue.lock().dropped_frames()
    }
}

pub struct UplinkPump {
    shared: Arc<UplinkShared>,
    task: Option<JoinHandle<()>>,
}

impl UplinkPump {
    /// Start the sender task. Draining waits for [`set_ready`](Self::set_ready).
    pub fn spawn(max_frames: usize, sender: Arc<dyn FrameSender>) -> Self {
        let shared = Arc::new(UplinkShared {
            queue: Mutex::new(FrameQueue::new(max_frames)),
            sample_rate: AtomicU32::new(UPLINK_SAMPLE_RATE),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        });

        let task = tokio::spawn(Self::run(shared.clone(), sender));
        Self {
            shared,
            task: Some(task),
        }
    }

    async fn run(shared: Arc<UplinkShared>, sender: Arc<dyn FrameSender>) {
        loop {
            shared.wake.notified().await;

            loop {
                if shared.stopped.load(Ordering::Acquire) {
                    return;
                }
                if !shared.can_drain() {
                    break;
                }

                let next = shared.queue.lock().pop_front();
                let Some(pcm) = next else {
                    break;
                };
                let sample_rate = shared.sample_rate.load(Ordering::Acquire);

                if let Err(e) = sender.send_audio(pcm, sample_rate).await {
                    tracing::debug!("Uplink send failed: {e}");
                }
            }
        }
    }

    pub fn handle(&self) -> UplinkHandle {
        UplinkHandle {
            shared: self.shared.clone(),
        }
    }

    /// Open the gate once the provider has acknowledged setup
    pub fn set_ready(&self, ready: bool) {
        self.shared.ready.store(ready, Ordering::Release);
        self.shared.wake.notify_one();
    }

    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
        self.shared.wake.notify_one();
    }

    pub fn queued_frames(&self) -> usize {
        self.shared.queue.lock().queued_frames()
    }

    /// Drop queued audio and end the sender task. A send already in flight
    /// may still complete; nothing follows it.
    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.queue.lock().clear();
        self.shared.wake.notify_one();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for UplinkPump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const CHUNK_FRAMES: usize = 320;

    /// Sender that takes 50 ms per message and records what it saw
    #[derive(Default)]
    struct SlowSender {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        sent: Mutex<Vec<(u16, u32)>>,
    }

    #[async_trait]
    impl FrameSender for SlowSender {
        async fn send_audio(&self, pcm: Bytes, sample_rate: u32) -> RealtimeResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.sent
                .lock()
                .push((u16::from_le_bytes([pcm[0], pcm[1]]), sample_rate));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn chunk(index: u16) -> ConvertedChunk {
        let mut pcm = vec![0u8; CHUNK_FRAMES * 2];
        pcm[..2].copy_from_slice(&index.to_le_bytes());
        ConvertedChunk {
            pcm: Bytes::from(pcm),
            sample_rate: UPLINK_SAMPLE_RATE,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_keeps_newest_audio_with_one_send_in_flight() {
        let sender = Arc::new(SlowSender::default());
        let pump = UplinkPump::spawn(4000, sender.clone());
        pump.set_ready(true);
        let handle = pump.handle();

        for i in 0..100u16 {
            assert!(handle.push(chunk(i)));
            assert!(handle.queued_frames() <= 4000);
        }
        // 12 chunks of 320 frames fit under 4000
        assert_eq!(handle.queued_frames(), 12 * CHUNK_FRAMES);

        tokio::time::sleep(Duration::from_secs(2)).await;

        let sent = sender.sent.lock().clone();
        let indices: Vec<u16> = sent.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (88..100).collect::<Vec<_>>());
        assert!(sent.iter().all(|(_, rate)| *rate == 16_000));
        assert_eq!(sender.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(pump.queued_frames(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gates_refuse_audio() {
        let sender = Arc::new(SlowSender::default());
        let pump = UplinkPump::spawn(4000, sender.clone());
        let handle = pump.handle();

        // Before setup completes
        assert!(!handle.push(chunk(1)));

        pump.set_ready(true);
        pump.set_muted(true);
        assert!(!handle.push(chunk(2)));

        pump.set_muted(false);
        assert!(handle.push(chunk(3)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let indices: Vec<u16> = sender.sent.lock().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_queue() {
        let sender = Arc::new(SlowSender::default());
        let mut pump = UplinkPump::spawn(4000, sender.clone());
        let handle = pump.handle();
        pump.set_ready(true);

        for i in 0..5u16 {
            handle.push(chunk(i));
        }
        pump.stop();
        assert_eq!(handle.queued_frames(), 0);
        assert!(!handle.push(chunk(9)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(sender.sent.lock().is_empty());
    }
}
