//! Monotonic wall clock and NTP-era timestamps.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_UNIX_OFFSET_MS: i64 = 2_208_988_800_000;

static T0: OnceLock<i64> = OnceLock::new();

/// Milliseconds since the Unix epoch, as a signed integer (matches the
/// reference implementation's `milliseconds_since_1970`).
#[must_use]
pub fn milliseconds_since_epoch() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn reference_time() -> i64 {
    *T0.get_or_init(|| milliseconds_since_epoch() - NTP_UNIX_OFFSET_MS)
}

/// A 64-bit NTP timestamp: whole seconds since the NTP epoch plus a 32-bit
/// fixed-point fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Whole seconds since the NTP epoch.
    pub sec: u32,
    /// Fractional second, as a 32-bit fixed-point value (`frac / 2^32` seconds).
    pub frac: u32,
}

impl NtpTimestamp {
    /// The zero timestamp, used for padding fields that must be present but
    /// carry no information (e.g. a timing request's unused `received_time`).
    pub const ZERO: Self = Self { sec: 0, frac: 0 };

    /// Capture the current time as an NTP timestamp, relative to this
    /// process's reference instant (captured once, on first use).
    #[must_use]
    pub fn now() -> Self {
        let delta = milliseconds_since_epoch() - reference_time();
        let sec = delta / 1000;
        let rem_ms = delta - sec * 1000;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let frac = (rem_ms as f64 * 4_294_967.296) as u32;
        Self {
            sec: u32::try_from(sec.max(0)).unwrap_or(u32::MAX),
            frac,
        }
    }

    /// Encode as 8 big-endian bytes: `sec` then `frac`.
    #[must_use]
    pub fn encode(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..4].copy_from_slice(&self.sec.to_be_bytes());
        out[4..8].copy_from_slice(&self.frac.to_be_bytes());
        out
    }

    /// Decode from 8 big-endian bytes.
    #[must_use]
    pub fn decode(bytes: &[u8; 8]) -> Self {
        Self {
            sec: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            frac: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let ts = NtpTimestamp { sec: 42, frac: 0x8000_0000 };
        let bytes = ts.encode();
        assert_eq!(NtpTimestamp::decode(&bytes), ts);
    }

    #[test]
    fn now_is_nonzero_after_reference_capture() {
        let a = NtpTimestamp::now();
        let b = NtpTimestamp::now();
        assert!(b.sec > 0 || b.frac >= a.frac || b.sec >= a.sec);
    }
}
