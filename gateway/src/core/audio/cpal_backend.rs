//! Audio device I/O through cpal.
//!
//! Capture runs at the device's native configuration and is downmixed to mono
//! on the audio thread; resampling to the uplink rate happens in the live
//! client. Playback opens a mono stream at the requested rate and drains a
//! small buffer queue, reporting each finished buffer through its completion.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use super::device::{
    AudioBackend, MicrophoneCapture, PlaybackDone, SpeakerOutput, TapBuffer, TapCallback,
    tap_buffer_frames,
};
use super::{AudioError, AudioResult};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by exactly one capture or speaker handle and
/// only touched through `&mut self` methods, so it is never used from two
/// threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Average interleaved frames down to mono
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Default host devices through cpal
#[derive(Debug, Default, Clone)]
pub struct CpalAudioBackend;

pub struct CpalCapture {
    stream: Option<SendableStream>,
}

impl MicrophoneCapture for CpalCapture {
    fn start(&mut self) -> AudioResult<()> {
        match &self.stream {
            Some(stream) => stream
                .0
                .play()
                .map_err(|e| AudioError::Stream(format!("Failed to start capture: {e}"))),
            None => Err(AudioError::Stream("Capture already stopped".to_string())),
        }
    }

    fn pause(&mut self) {
        if let Some(stream) = &self.stream
            && let Err(e) = stream.0.pause()
        {
            tracing::debug!("Failed to pause capture: {e}");
        }
    }

    fn stop(&mut self) {
        // Dropping the stream closes the device
        self.stream.take();
    }
}

struct QueuedBuffer {
    samples: Vec<i16>,
    position: usize,
    done: Option<PlaybackDone>,
}

pub struct CpalSpeaker {
    stream: Option<SendableStream>,
    queue: Arc<Mutex<VecDeque<QueuedBuffer>>>,
    playing: bool,
}

impl SpeakerOutput for CpalSpeaker {
    fn schedule(&mut self, samples: Vec<i16>, done: PlaybackDone) -> AudioResult<()> {
        self.queue.lock().push_back(QueuedBuffer {
            samples,
            position: 0,
            done: Some(done),
        });
        Ok(())
    }

    fn stop(&mut self) {
        let dropped: Vec<QueuedBuffer> = self.queue.lock().drain(..).collect();
        for mut buffer in dropped {
            if let Some(done) = buffer.done.take() {
                done();
            }
        }
        if let Some(stream) = &self.stream
            && let Err(e) = stream.0.pause()
        {
            tracing::debug!("Failed to pause playback: {e}");
        }
        self.playing = false;
    }

    fn play(&mut self) -> AudioResult<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::Stream("Speaker closed".to_string()))?;
        stream
            .0
            .play()
            .map_err(|e| AudioError::Stream(format!("Failed to start playback: {e}")))?;
        self.playing = true;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[async_trait]
impl AudioBackend for CpalAudioBackend {
    fn open_microphone(&self, tap: TapCallback) -> AudioResult<Box<dyn MicrophoneCapture>> {
        use cpal::SampleFormat;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string()))?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceUnavailable(format!("input config: {e}")))?;

        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let mut stream_config: cpal::StreamConfig = default_config.clone().into();
        stream_config.buffer_size = cpal::BufferSize::Fixed(tap_buffer_frames(native_rate) as u32);

        tracing::info!(
            rate = native_rate,
            channels,
            format = ?default_config.sample_format(),
            "Opening microphone"
        );

        let err_callback = |err| {
            tracing::warn!("Audio capture stream error: {err}");
        };

        let mut tap = tap;
        let stream = match default_config.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    tap(TapBuffer {
                        samples: downmix(data, channels),
                        sample_rate: native_rate,
                    });
                },
                err_callback,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    tap(TapBuffer {
                        samples: downmix(&floats, channels),
                        sample_rate: native_rate,
                    });
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "input sample format {fmt:?}"
                )));
            }
        }
        .map_err(|e| AudioError::Stream(format!("Failed to build capture stream: {e}")))?;

        // Some backends start streams on creation
        let _ = stream.pause();

        Ok(Box::new(CpalCapture {
            stream: Some(SendableStream(stream)),
        }))
    }

    fn open_speaker(&self, sample_rate: u32) -> AudioResult<Box<dyn SpeakerOutput>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: Arc<Mutex<VecDeque<QueuedBuffer>>> = Arc::new(Mutex::new(VecDeque::new()));
        let render_queue = queue.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut finished = Vec::new();
                    {
                        let mut queue = render_queue.lock();
                        for slot in data.iter_mut() {
                            *slot = 0.0;
                            while let Some(front) = queue.front_mut() {
                                if front.position < front.samples.len() {
                                    *slot = front.samples[front.position] as f32 / i16::MAX as f32;
                                    front.position += 1;
                                    break;
                                }
                                if let Some(mut done_buffer) = queue.pop_front()
                                    && let Some(done) = done_buffer.done.take()
                                {
                                    finished.push(done);
                                }
                            }
                        }
                        if let Some(front) = queue.front()
                            && front.position >= front.samples.len()
                            && let Some(mut done_buffer) = queue.pop_front()
                            && let Some(done) = done_buffer.done.take()
                        {
                            finished.push(done);
                        }
                    }
                    // Completions run outside the lock
                    for done in finished {
                        done();
                    }
                },
                |err| {
                    tracing::warn!("Audio playback stream error: {err}");
                },
                None,
            )
            .map_err(|e| AudioError::Stream(format!("Failed to build playback stream: {e}")))?;

        tracing::info!(rate = sample_rate, "Opened speaker");

        Ok(Box::new(CpalSpeaker {
            stream: Some(SendableStream(stream)),
            queue,
            playing: false,
        }))
    }
}
