//! G.711 μ-law companding for the peer-connection audio tracks.

/// Sample rate of G.711 audio
pub const G711_SAMPLE_RATE: u32 = 8_000;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// Compress one linear PCM16 sample
pub fn encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(CLIP) + BIAS;

    let exponent = (7 - (pcm << 17).leading_zeros().min(7)) as i32;
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Expand one μ-law byte to linear PCM16
pub fn decode_sample(byte: u8) -> i16 {
    let byte = !byte as i32;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode_sample(s)).collect()
}

pub fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| decode_sample(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(encode_sample(0), 0xFF);
        assert_eq!(decode_sample(0xFF), 0);
        assert_eq!(decode_sample(0x7F), 0);
        assert_eq!(decode_sample(0x80), 32_124);
        assert_eq!(decode_sample(0x00), -32_124);
    }

    #[test]
    fn test_companding_error_is_bounded() {
        for sample in (-32_000i16..=32_000).step_by(97) {
            let restored = decode_sample(encode_sample(sample)) as i32;
            let error = (restored - sample as i32).abs();
            // Quantization step grows with magnitude; stays within ~1/16 of it
            assert!(
                error <= (sample as i32).abs() / 16 + 8,
                "sample {sample} restored as {restored}"
            );
        }
    }

    #[test]
    fn test_sign_symmetry() {
        for sample in [1i16, 100, 1_000, 10_000, 30_000] {
            assert_eq!(
                decode_sample(encode_sample(sample)),
                -decode_sample(encode_sample(-sample))
            );
        }
    }
}
