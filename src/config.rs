//! Wire-significant constants and tunables.
//!
//! None are configurable per-receiver because the protocol fixes them for
//! all AirTunes v2 (RAOP) participants.

use std::time::Duration;

/// PCM frames carried by a single audio packet.
pub const FRAMES_PER_PACKET: u32 = 352;

/// Sample rate assumed throughout the protocol.
pub const SAMPLING_RATE: u32 = 44100;

/// Audio packets between consecutive sync packets.
pub const SYNC_PERIOD: u32 = 126;

/// Pacing tick period for the audio scheduler.
pub const STREAM_LATENCY: Duration = Duration::from_millis(50);

/// Default timeout for an RTSP request/response round trip.
pub const DEFAULT_RTSP_TIMEOUT: Duration = Duration::from_secs(5);

/// First control port tried when probing for a free local UDP port.
pub const DEFAULT_CONTROL_PORT: u16 = 6001;

/// First timing port tried when probing for a free local UDP port.
pub const DEFAULT_TIMING_PORT: u16 = 6002;

/// RTP timestamp offset baked into every packet's timestamp, expressing the
/// protocol's fixed startup latency: `2 * SAMPLING_RATE`.
pub const RAOP_FRAME_LATENCY: u32 = 2 * SAMPLING_RATE;

/// Minimum jitter-buffer latency assumed by receivers, in frames.
pub const RAOP_LATENCY_MIN: u32 = 11025;

/// Count of audio packets equivalent to the protocol's ~2.25s rewind target
/// applied on pause: `(RAOP_FRAME_LATENCY + RAOP_LATENCY_MIN) / FRAMES_PER_PACKET`.
#[must_use]
pub fn sequence_latency() -> u32 {
    (RAOP_FRAME_LATENCY + RAOP_LATENCY_MIN) / FRAMES_PER_PACKET
}

/// PCM format assumed for every provider: 16-bit signed, interleaved stereo.
pub const CHANNELS: u32 = 2;
/// Bits per sample for the PCM format this crate encodes.
pub const BITS_PER_SAMPLE: u32 = 16;

/// Byte size of one full PCM frame (`FRAMES_PER_PACKET` samples, stereo, 16-bit).
#[must_use]
pub fn pcm_frame_bytes() -> usize {
    (FRAMES_PER_PACKET * CHANNELS * (BITS_PER_SAMPLE / 8)) as usize
}

/// Well-known ANNOUNCE `a=rsaaeskey`/`a=aesiv` pair used by legacy RAOP
/// (AirPort Express-era) receivers that never negotiate per-session keys.
/// Shipped verbatim, matching the constant the protocol's original Python
/// implementation embeds.
pub const LEGACY_RSA_AES_KEY_B64: &str =
    "AC9PAGWT0LCxB1nRiIR8d8zchs8R7BPHc7O5ZmE7lY+vFAzHh89vBhQcXFkPAiUQ3FGz2vM2LWngkUngMTl3UJDg5OW6RuAPiFOdxnNDsWBLU0fOhdfWP9hxK0a5hkwYcYt+BAe+4MS5mY2jQbSXNAO3lKTVW8zXpY42bOYXoVo=";
/// Companion AES IV, base64, paired with [`LEGACY_RSA_AES_KEY_B64`].
pub const LEGACY_AES_IV_B64: &str = "W+Yv9P4/xD9qBdsRIKrzjA==";

/// The 16-byte plaintext AES key that [`LEGACY_RSA_AES_KEY_B64`] is the
/// RSA-encrypted form of. The sender never decrypts the ciphertext it ships
/// (it has no access to the receiver's private key); instead it uses this
/// raw key directly for the CBC pass, shipping the pre-computed ciphertext
/// verbatim alongside it in ANNOUNCE.
pub const LEGACY_AES_KEY_B64: &str = "4rSB9U2g3nXDpPl7yTgxUQ==";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_latency_matches_spec() {
        assert_eq!(sequence_latency(), 281);
    }

    #[test]
    fn pcm_frame_size_matches_spec() {
        assert_eq!(pcm_frame_bytes(), 352 * 2 * 2);
    }
}
