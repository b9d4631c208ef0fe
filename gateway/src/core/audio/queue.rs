//! Bounded PCM frame queue with head-drop overflow.
//!
//! Used on both audio paths: between the microphone tap and the socket sender,
//! and between the socket reader and the speaker. When a new chunk would push
//! the total past the budget, the oldest chunks are dropped first; a single
//! chunk larger than the whole budget keeps only its newest frames.

use bytes::Bytes;
use std::collections::VecDeque;

use super::pcm::{BYTES_PER_FRAME, frame_count};

#[derive(Debug)]
pub struct FrameQueue {
    chunks: VecDeque<Bytes>,
    queued_frames: usize,
    max_frames: usize,
    dropped_frames: u64,
}

impl FrameQueue {
    pub fn new(max_frames: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            queued_frames: 0,
            max_frames,
            dropped_frames: 0,
        }
    }

    /// Append a PCM16LE chunk, dropping from the head to stay within budget.
    ///
    /// Returns the number of frames dropped by this call.
    pub fn push(&mut self, chunk: Bytes) -> usize {
        let mut chunk = chunk;
        let mut dropped = 0;

        let incoming = frame_count(&chunk);
        if incoming == 0 {
            return 0;
        }
        if incoming > self.max_frames {
            let excess = incoming - self.max_frames;
            chunk = chunk.slice(excess * BYTES_PER_FRAME..incoming * BYTES_PER_FRAME);
            dropped += excess;
        }

        let incoming = frame_count(&chunk);
        while self.queued_frames + incoming > self.max_frames {
            let Some(head) = self.chunks.pop_front() else {
                break;
            };
            let head_frames = frame_count(&head);
            self.queued_frames -= head_frames;
            dropped += head_frames;
        }

        if incoming > 0 {
            self.queued_frames += incoming;
            self.chunks.push_back(chunk);
        }

        self.dropped_frames += dropped as u64;
        dropped
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        let chunk = self.chunks.pop_front()?;
        self.queued_frames -= frame_count(&chunk);
        Some(chunk)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.queued_frames = 0;
    }

    pub fn queued_frames(&self) -> usize {
        self.queued_frames
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Frames discarded since creation
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(frames: usize, tag: u8) -> Bytes {
        Bytes::from(vec![tag; frames * BYTES_PER_FRAME])
    }

    #[test]
    fn test_push_within_budget() {
        let mut queue = FrameQueue::new(4_000);
        assert_eq!(queue.push(chunk(320, 1)), 0);
        assert_eq!(queue.push(chunk(320, 2)), 0);
        assert_eq!(queue.queued_frames(), 640);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_head_drop_keeps_newest() {
        let mut queue = FrameQueue::new(1_000);
        for tag in 0..5u8 {
            queue.push(chunk(300, tag));
            assert!(queue.queued_frames() <= 1_000);
        }

        // 3 chunks of 300 fit; tags 0 and 1 were dropped
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped_frames(), 600);
        assert_eq!(queue.pop_front().unwrap()[0], 2);
    }

    #[test]
    fn test_oversized_chunk_keeps_tail() {
        let mut queue = FrameQueue::new(100);
        queue.push(chunk(10, 9));

        let mut big = vec![0u8; 150 * BYTES_PER_FRAME];
        big[149 * BYTES_PER_FRAME] = 7;
        let dropped = queue.push(Bytes::from(big));

        assert_eq!(dropped, 60);
        assert_eq!(queue.queued_frames(), 100);
        assert_eq!(queue.len(), 1);
        let kept = queue.pop_front().unwrap();
        assert_eq!(kept.len(), 100 * BYTES_PER_FRAME);
        assert_eq!(kept[99 * BYTES_PER_FRAME], 7);
    }

    #[test]
    fn test_downlink_budget_under_burst() {
        let mut queue = FrameQueue::new(6_000);
        for i in 0..100u8 {
            queue.push(chunk(480, i));
            assert!(queue.queued_frames() <= 6_000);
        }
        assert_eq!(queue.queued_frames(), 12 * 480);
    }

    #[test]
    fn test_clear_resets_count() {
        let mut queue = FrameQueue::new(100);
        queue.push(chunk(50, 0));
        queue.clear();
        assert_eq!(queue.queued_frames(), 0);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }
}
