//! Streaming linear-interpolation resampler.
//!
//! Microphone taps arrive at the device's native rate (44.1 or 48 kHz in
//! practice) and are converted to 16 kHz mono PCM16LE before they are queued
//! for upload. The resampler carries its fractional read position and the last
//! sample across buffers, so consecutive taps join without clicks.

use bytes::Bytes;

use super::device::TapBuffer;
use super::pcm::{encode_pcm16le, f32_to_i16};
use super::{AudioError, AudioResult};

/// Largest supported ratio between source and target rate
const MAX_RATE_RATIO: u32 = 16;

#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    step: f64,
    /// Next output position in current-buffer coordinates; `-1.0..0.0` lies
    /// between the previous buffer's last sample and this buffer's first.
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> AudioResult<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "cannot resample {from_rate} Hz -> {to_rate} Hz"
            )));
        }
        if from_rate > to_rate.saturating_mul(MAX_RATE_RATIO)
            || to_rate > from_rate.saturating_mul(MAX_RATE_RATIO)
        {
            return Err(AudioError::UnsupportedFormat(format!(
                "rate ratio {from_rate} Hz -> {to_rate} Hz out of range"
            )));
        }

        Ok(Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate as f64,
            position: 0.0,
            last: None,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Resample one buffer, continuing from the previous call.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        if self.from_rate == self.to_rate {
            self.last = input.last().copied();
            return input.to_vec();
        }

        let len = input.len();
        let first = input[0];
        let previous = self.last.unwrap_or(first);
        let sample_at = |idx: isize| -> f32 {
            if idx < 0 {
                previous
            } else {
                input[(idx as usize).min(len - 1)]
            }
        };

        let capacity = ((len as f64) / self.step).ceil() as usize + 1;
        let mut out = Vec::with_capacity(capacity);

        let last_index = (len - 1) as f64;
        while self.position <= last_index {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let idx = base as isize;
            let s0 = sample_at(idx);
            let s1 = sample_at(idx + 1);
            out.push(s0 + (s1 - s0) * frac);
            self.position += self.step;
        }

        self.position -= len as f64;
        self.last = input.last().copied();
        out
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = None;
    }
}

/// One converted microphone chunk ready for the uplink queue
#[derive(Debug, Clone)]
pub struct ConvertedChunk {
    pub pcm: Bytes,
    pub sample_rate: u32,
}

/// Converts tap buffers to PCM16LE at the uplink rate.
///
/// The resampler is created lazily for the first buffer's rate and rebuilt if
/// the device rate changes mid-session (route changes can do that). When no
/// resampler can be built the samples pass through at the native rate.
#[derive(Debug)]
pub struct UplinkConverter {
    target_rate: u32,
    resampler: Option<LinearResampler>,
    passthrough_rate: Option<u32>,
}

impl UplinkConverter {
    pub fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            resampler: None,
            passthrough_rate: None,
        }
    }

    pub fn convert(&mut self, buffer: &TapBuffer) -> Option<ConvertedChunk> {
        if buffer.samples.is_empty() || buffer.sample_rate == 0 {
            return None;
        }

        let needs_rebuild = match (&self.resampler, self.passthrough_rate) {
            (Some(r), _) => r.from_rate() != buffer.sample_rate,
            (None, Some(rate)) => rate != buffer.sample_rate,
            (None, None) => true,
        };
        if needs_rebuild {
            match LinearResampler::new(buffer.sample_rate, self.target_rate) {
                Ok(resampler) => {
                    tracing::debug!(
                        from = buffer.sample_rate,
                        to = self.target_rate,
                        "Created uplink resampler"
                    );
                    self.resampler = Some(resampler);
                    self.passthrough_rate = None;
                }
                Err(e) => {
                    tracing::warn!("Uplink resampler unavailable ({e}); sending native rate");
                    self.resampler = None;
                    self.passthrough_rate = Some(buffer.sample_rate);
                }
            }
        }

        let (samples, sample_rate) = match self.resampler.as_mut() {
            Some(resampler) => (resampler.process(&buffer.samples), self.target_rate),
            None => (buffer.samples.clone(), buffer.sample_rate),
        };
        if samples.is_empty() {
            return None;
        }

        Some(ConvertedChunk {
            pcm: Bytes::from(encode_pcm16le(&f32_to_i16(&samples))),
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(rate: u32, freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (2.0 * PI * freq * n as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(LinearResampler::new(0, 16_000).is_err());
        assert!(LinearResampler::new(48_000, 0).is_err());
        assert!(LinearResampler::new(768_000, 16_000).is_err());
    }

    #[test]
    fn test_output_length_tracks_ratio_across_buffers() {
        let mut resampler = LinearResampler::new(48_000, 16_000).unwrap();
        let input = sine(48_000, 440.0, 960);

        let mut total = 0;
        for _ in 0..50 {
            total += resampler.process(&input).len();
        }
        // 50 x 20 ms at 16 kHz
        assert!((total as i64 - 16_000).abs() <= 1, "got {total}");
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let original = sine(16_000, 440.0, 1_600);

        let mut up = LinearResampler::new(16_000, 48_000).unwrap();
        let mut down = LinearResampler::new(48_000, 16_000).unwrap();

        let upsampled: Vec<f32> = original.chunks(320).flat_map(|c| up.process(c)).collect();
        let restored: Vec<f32> = upsampled.chunks(960).flat_map(|c| down.process(c)).collect();

        assert!((restored.len() as i64 - original.len() as i64).abs() <= 2);

        // Interior samples only; both edges are interpolated against a held sample
        let max_err = original
            .iter()
            .zip(restored.iter())
            .skip(4)
            .take(original.len() - 8)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.02, "max error {max_err}");
    }

    #[test]
    fn test_converter_targets_uplink_rate() {
        let mut converter = UplinkConverter::new(16_000);
        let buffer = TapBuffer {
            samples: sine(48_000, 440.0, 960),
            sample_rate: 48_000,
        };

        let chunk = converter.convert(&buffer).unwrap();
        assert_eq!(chunk.sample_rate, 16_000);
        assert_eq!(chunk.pcm.len(), 320 * 2);
    }

    #[test]
    fn test_converter_passthrough_when_unsupported() {
        let mut converter = UplinkConverter::new(16_000);
        let buffer = TapBuffer {
            samples: vec![0.25; 100],
            sample_rate: 384_000,
        };

        let chunk = converter.convert(&buffer).unwrap();
        assert_eq!(chunk.sample_rate, 384_000);
        assert_eq!(chunk.pcm.len(), 200);
    }

    #[test]
    fn test_converter_skips_empty_buffers() {
        let mut converter = UplinkConverter::new(16_000);
        let buffer = TapBuffer {
            samples: Vec::new(),
            sample_rate: 48_000,
        };
        assert!(converter.convert(&buffer).is_none());
    }
}
