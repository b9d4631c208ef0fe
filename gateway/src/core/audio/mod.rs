//! Audio plumbing shared by the live session clients.
//!
//! - `pcm` - PCM16LE encoding helpers and wire sample rates
//! - `resample` - streaming linear resampler and the uplink converter
//! - `queue` - bounded head-drop frame queues
//! - `g711` - μ-law companding for peer-connection tracks
//! - `device` - microphone / speaker abstractions and a silent backend
//! - `route` - audio session configuration and output route policy
//! - `cpal_backend` - device I/O through cpal (feature `device-audio`)

#[cfg(feature = "device-audio")]
pub mod cpal_backend;
pub mod device;
pub mod g711;
pub mod pcm;
pub mod queue;
pub mod resample;
pub mod route;

use thiserror::Error;

pub use device::{
    AudioBackend, MicrophoneCapture, NullAudioBackend, PlaybackDone, SpeakerOutput, TapBuffer,
    TapCallback,
};
pub use pcm::{DOWNLINK_SAMPLE_RATE, UPLINK_SAMPLE_RATE};
pub use queue::FrameQueue;
pub use resample::{LinearResampler, UplinkConverter};
pub use route::{
    AudioSession, AudioSessionConfig, InMemoryAudioSession, OutputOverride, OutputPort, RouteObserver,
    RoutePolicy,
};

/// Errors raised by audio devices and the audio session
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No audio device available: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Audio session error: {0}")]
    Session(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
