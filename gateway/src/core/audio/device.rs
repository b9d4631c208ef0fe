//! Microphone and speaker abstractions.
//!
//! Live clients never touch a sound API directly; they ask an [`AudioBackend`]
//! for a capture handle and a playback handle. The cpal backend lives behind
//! the `device-audio` feature; [`NullAudioBackend`] is a silent stand-in for
//! headless hosts and tests.

use async_trait::async_trait;

use super::AudioResult;

/// One microphone tap: mono float samples at the device's native rate
#[derive(Debug, Clone, PartialEq)]
pub struct TapBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Callback receiving microphone taps on the audio thread
pub type TapCallback = Box<dyn FnMut(TapBuffer) + Send + 'static>;

/// Completion notification for one scheduled playback buffer
pub type PlaybackDone = Box<dyn FnOnce() + Send + 'static>;

/// Tap size for roughly 20 ms of audio, never below 256 frames
pub fn tap_buffer_frames(sample_rate: u32) -> usize {
    ((sample_rate / 50) as usize).max(256)
}

/// A running (or paused) microphone capture
pub trait MicrophoneCapture: Send {
    fn start(&mut self) -> AudioResult<()>;
    /// Stop delivering taps but keep the device open
    fn pause(&mut self);
    /// Release the device; the capture cannot be restarted
    fn stop(&mut self);
}

/// A PCM16 mono playback sink with its own scheduling queue
pub trait SpeakerOutput: Send {
    /// Queue a buffer; `done` runs once it has been played.
    fn schedule(&mut self, samples: Vec<i16>, done: PlaybackDone) -> AudioResult<()>;
    /// Drop everything scheduled. Completions of dropped buffers may still fire.
    fn stop(&mut self);
    fn play(&mut self) -> AudioResult<()>;
    fn is_playing(&self) -> bool;
}

/// Source of microphone and speaker handles
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Ask the platform for microphone access
    async fn request_microphone_permission(&self) -> bool {
        true
    }

    /// Open the microphone with echo cancellation where the platform offers it.
    ///
    /// Voice processing is best-effort; capture proceeds without it.
    fn open_microphone(&self, tap: TapCallback) -> AudioResult<Box<dyn MicrophoneCapture>>;

    /// Open a mono PCM16 output at `sample_rate`
    fn open_speaker(&self, sample_rate: u32) -> AudioResult<Box<dyn SpeakerOutput>>;
}

/// Backend with no devices: the microphone is silent and playback completes
/// immediately.
#[derive(Debug, Default, Clone)]
pub struct NullAudioBackend;

struct NullCapture;

impl MicrophoneCapture for NullCapture {
    fn start(&mut self) -> AudioResult<()> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn stop(&mut self) {}
}

#[derive(Default)]
struct NullSpeaker {
    playing: bool,
}

impl SpeakerOutput for NullSpeaker {
    fn schedule(&mut self, _samples: Vec<i16>, done: PlaybackDone) -> AudioResult<()> {
        done();
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn play(&mut self) -> AudioResult<()> {
        self.playing = true;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[async_trait]
impl AudioBackend for NullAudioBackend {
    fn open_microphone(&self, _tap: TapCallback) -> AudioResult<Box<dyn MicrophoneCapture>> {
        Ok(Box::new(NullCapture))
    }

    fn open_speaker(&self, _sample_rate: u32) -> AudioResult<Box<dyn SpeakerOutput>> {
        Ok(Box::new(NullSpeaker::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tap_buffer_frames() {
        assert_eq!(tap_buffer_frames(48_000), 960);
        assert_eq!(tap_buffer_frames(8_000), 256);
    }

    #[tokio::test]
    async fn test_null_backend_completes_playback() {
        let backend = NullAudioBackend;
        assert!(backend.request_microphone_permission().await);

        let mut speaker = backend.open_speaker(24_000).unwrap();
        speaker.play().unwrap();
        assert!(speaker.is_playing());

        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        speaker
            .schedule(
                vec![0; 480],
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
