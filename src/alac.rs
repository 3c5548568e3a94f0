//! ALAC encoding: one PCM frame in, one ALAC payload out.
//!
//! A single [`AlacCodec`] is built once per scheduler and reused across
//! every frame of a track: `alac_encoder::AlacEncoder` is constructed once
//! and `encode()` is called per packet rather than rebuilding it.

use alac_encoder::{AlacEncoder, FormatDescription};

use crate::config::{CHANNELS, FRAMES_PER_PACKET, SAMPLING_RATE};

/// Output buffer large enough for one encoded ALAC frame at 352
/// samples/packet, 16-bit stereo (worst case is barely compressed, so this
/// generously covers the PCM size plus ALAC framing overhead).
const OUT_BUFFER_SIZE: usize = 4096;

/// Wraps one reusable ALAC encoder instance.
pub struct AlacCodec {
    encoder: AlacEncoder,
    input_format: FormatDescription,
    out_buffer: Vec<u8>,
}

impl AlacCodec {
    /// Build a codec for the standard RAOP PCM format: 44.1kHz, 16-bit,
    /// stereo, 352 frames per packet.
    #[must_use]
    pub fn new() -> Self {
        let alac_format =
            FormatDescription::alac(f64::from(SAMPLING_RATE), FRAMES_PER_PACKET, CHANNELS);
        let input_format = FormatDescription::pcm::<i16>(f64::from(SAMPLING_RATE), CHANNELS);

        Self {
            encoder: AlacEncoder::new(&alac_format),
            input_format,
            out_buffer: vec![0u8; OUT_BUFFER_SIZE],
        }
    }

    /// Encode one PCM frame (`FRAMES_PER_PACKET * CHANNELS * 2` bytes) to
    /// ALAC, returning the encoded payload.
    pub fn encode(&mut self, pcm: &[u8]) -> Vec<u8> {
        let size = self.encoder.encode(&self.input_format, pcm, &mut self.out_buffer);
        self.out_buffer[..size].to_vec()
    }
}

impl Default for AlacCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pcm_frame_bytes;

    #[test]
    fn encodes_a_silent_frame_to_nonempty_output() {
        let mut codec = AlacCodec::new();
        let silence = vec![0u8; pcm_frame_bytes()];
        let encoded = codec.encode(&silence);
        assert!(!encoded.is_empty());
        assert!(encoded.len() <= OUT_BUFFER_SIZE);
    }

    #[test]
    fn encoder_instance_is_reused_across_calls() {
        let mut codec = AlacCodec::new();
        let frame_a = vec![1u8; pcm_frame_bytes()];
        let frame_b = vec![2u8; pcm_frame_bytes()];
        let a = codec.encode(&frame_a);
        let b = codec.encode(&frame_b);
        assert!(!a.is_empty());
        assert!(!b.is_empty());
    }
}
