//! PCM16LE helpers.
//!
//! Both providers speak signed 16-bit little-endian mono PCM: 16 kHz towards
//! the model, 24 kHz back from it.

/// Sample rate of audio sent to the socket provider
pub const UPLINK_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of audio received from the socket provider
pub const DOWNLINK_SAMPLE_RATE: u32 = 24_000;

/// Bytes per mono PCM16 frame
pub const BYTES_PER_FRAME: usize = 2;

/// Convert float samples in `[-1.0, 1.0]` to i16, clamping out-of-range input.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

/// Serialize samples as PCM16LE bytes
pub fn encode_pcm16le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_FRAME);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Parse PCM16LE bytes; a trailing odd byte is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_FRAME)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Number of mono PCM16 frames in a byte buffer
pub fn frame_count(bytes: &[u8]) -> usize {
    bytes.len() / BYTES_PER_FRAME
}

/// Frame budget for `seconds` of audio at `sample_rate`
pub fn frames_for(sample_rate: u32, seconds: f64) -> usize {
    (sample_rate as f64 * seconds).round() as usize
}
