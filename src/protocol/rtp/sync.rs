//! Sync packet wire format: `[flags_a][0xD4][0x0007][now_minus_latency][ntp][now]`.

use super::packet::{RtpDecodeError, RtpHeader};
use crate::clock::NtpTimestamp;

/// `flags_a` for the first sync packet of a burst (extension bit set).
const FLAG_A_FIRST: u8 = 0x90;
/// `flags_a` for every other sync packet.
const FLAG_A_REST: u8 = 0x80;
/// `flags_b`, constant for every sync packet.
const FLAG_B: u8 = 0xD4;
/// The sequence field is constant for sync packets.
const SEQ: u16 = 0x0007;

/// Total wire size of a sync packet.
pub const SIZE: usize = 20;

/// A control-port sync packet carrying the current playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    /// Whether this is the first sync after play/resume/flush.
    pub is_first: bool,
    /// `rtp_ts_without_latency(seq)`.
    pub now_minus_latency: u32,
    /// Current NTP time, captured once and shared by every receiver.
    pub ntp_time: NtpTimestamp,
    /// `rtp_ts(seq)`.
    pub now: u32,
}

impl SyncPacket {
    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; SIZE] {
        let header = RtpHeader {
            a: if self.is_first { FLAG_A_FIRST } else { FLAG_A_REST },
            b: FLAG_B,
            seq: SEQ,
        };
        let mut out = [0u8; SIZE];
        out[0..4].copy_from_slice(&header.encode());
        out[4..8].copy_from_slice(&self.now_minus_latency.to_be_bytes());
        out[8..16].copy_from_slice(&self.ntp_time.encode());
        out[16..20].copy_from_slice(&self.now.to_be_bytes());
        out
    }

    /// Decode from wire bytes.
    ///
    /// # Errors
    /// Returns [`RtpDecodeError::BufferTooSmall`] if fewer than [`SIZE`]
    /// bytes are available, or [`RtpDecodeError::UnexpectedPayloadType`] if
    /// the payload-type byte is not the sync packet's `0xD4`.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < SIZE {
            return Err(RtpDecodeError::BufferTooSmall { needed: SIZE, have: buf.len() });
        }
        let header = RtpHeader::decode(buf)?;
        if header.payload_type() != FLAG_B & 0x7F {
            return Err(RtpDecodeError::UnexpectedPayloadType(header.b));
        }
        let now_minus_latency = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ntp_time = NtpTimestamp::decode(&buf[8..16].try_into().unwrap());
        let now = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
        Ok(Self {
            is_first: header.extension(),
            now_minus_latency,
            ntp_time,
            now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_sets_flags_a_to_0x90() {
        let pkt = SyncPacket { is_first: true, now_minus_latency: 0, ntp_time: NtpTimestamp::ZERO, now: 88200 };
        let bytes = pkt.encode();
        assert_eq!(bytes[0], 0x90);
        assert_eq!(bytes[1], 0xD4);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0x0007);
    }

    #[test]
    fn round_trip() {
        let pkt = SyncPacket {
            is_first: false,
            now_minus_latency: 44352,
            ntp_time: NtpTimestamp { sec: 10, frac: 20 },
            now: 132552,
        };
        let bytes = pkt.encode();
        assert_eq!(SyncPacket::decode(&bytes).unwrap(), pkt);
    }
}
