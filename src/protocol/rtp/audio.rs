//! Audio packet wire format: `[flags_a][flags_b][seq][rtp_ts][ssrc][payload…]`.

use super::packet::{RtpDecodeError, RtpHeader};
use bytes::Bytes;

/// `flags_a` for every audio packet.
const FLAG_A: u8 = 0x80;
/// `flags_b` payload type/marker byte when the packet is the first of a burst.
const FLAG_B_FIRST: u8 = 0xE0;
/// `flags_b` payload type/marker byte for every subsequent packet.
const FLAG_B_REST: u8 = 0x60;

/// Fixed header size preceding the encoded (and possibly encrypted) audio payload.
pub const HEADER_SIZE: usize = 12;

/// One audio packet ready to `sendto` a receiver's server port.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    /// Packet header (flags + sequence).
    pub header: RtpHeader,
    /// RTP timestamp, `rtp_ts(seq)`.
    pub timestamp: u32,
    /// Session-wide device-magic SSRC.
    pub ssrc: u32,
    /// ALAC (optionally AES-encrypted) payload.
    pub payload: Bytes,
}

impl AudioPacket {
    /// Build a new audio packet.
    #[must_use]
    pub fn new(seq: u16, timestamp: u32, ssrc: u32, payload: Bytes, is_first: bool) -> Self {
        Self {
            header: RtpHeader {
                a: FLAG_A,
                b: if is_first { FLAG_B_FIRST } else { FLAG_B_REST },
                seq,
            },
            timestamp,
            ssrc,
            payload,
        }
    }

    /// Whether this packet is flagged as the first of a burst (play/resume/flush).
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.b == FLAG_B_FIRST
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Bytes::from(out)
    }

    /// Decode from wire bytes (used by tests and by receiver-side tooling).
    ///
    /// # Errors
    /// Returns [`RtpDecodeError::BufferTooSmall`] if the buffer is shorter
    /// than [`HEADER_SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }
        let header = RtpHeader::decode(buf)?;
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Ok(Self {
            header,
            timestamp,
            ssrc,
            payload: Bytes::copy_from_slice(&buf[HEADER_SIZE..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_flags() {
        let pkt = AudioPacket::new(0, 88200, 123_456_789, Bytes::from_static(b"x"), true);
        let bytes = pkt.encode();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 0xE0);
    }

    #[test]
    fn subsequent_packet_flags() {
        let pkt = AudioPacket::new(1, 88552, 1, Bytes::from_static(b"x"), false);
        let bytes = pkt.encode();
        assert_eq!(bytes[1], 0x60);
    }

    #[test]
    fn round_trip() {
        let pkt = AudioPacket::new(1050, 88200 + 1050 * 352, 999, Bytes::from_static(b"payload"), false);
        let bytes = pkt.encode();
        let decoded = AudioPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.header.seq, 1050);
        assert_eq!(decoded.timestamp, pkt.timestamp);
        assert_eq!(decoded.ssrc, 999);
        assert_eq!(&decoded.payload[..], b"payload");
    }
}
