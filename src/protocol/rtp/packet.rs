//! Shared RTP header bits common to every AirTunes packet kind.
//!
//! AirTunes repurposes the standard two flag bytes unevenly across packet
//! kinds (the audio packet's marker bit carries "is this the first packet
//! of a burst", the sync packet's extension bit carries the same meaning,
//! the timing/resend packets never vary either bit) so this module only
//! exposes the bit-level accessors; each packet kind in this crate builds
//! its own wire layout directly rather than going through one generic
//! "RTP packet" abstraction.

use thiserror::Error;

/// Extension bit within flag byte `a`.
pub const FLAG_A_EXTENSION: u8 = 0x10;
/// Marker bit within flag byte `b`.
pub const FLAG_B_MARKER: u8 = 0x80;
/// Payload-type mask within flag byte `b`.
pub const FLAG_B_PAYLOAD_TYPE: u8 = 0x7F;

/// The two flag bytes and sequence field shared by every AirTunes RTP-style
/// packet. Not a full 12-byte RTP header: audio packets extend this with a
/// timestamp and SSRC, control packets (sync/timing/resend) extend it
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Flag byte `a` (version/padding/extension/CSRC in standard RTP).
    pub a: u8,
    /// Flag byte `b` (marker bit + 7-bit payload type in standard RTP).
    pub b: u8,
    /// 16-bit sequence field. Audio packets use the real sequence number;
    /// control packets (sync/timing) use the constant `0x0007`.
    pub seq: u16,
}

impl RtpHeader {
    /// Size of the two flag bytes plus sequence field.
    pub const SIZE: usize = 4;

    /// The payload type carried in flag byte `b`, masking off the marker bit.
    #[must_use]
    pub fn payload_type(&self) -> u8 {
        self.b & FLAG_B_PAYLOAD_TYPE
    }

    /// Whether the marker bit is set in flag byte `b`.
    #[must_use]
    pub fn marker(&self) -> bool {
        self.b & FLAG_B_MARKER != 0
    }

    /// Whether the extension bit is set in flag byte `a`.
    #[must_use]
    pub fn extension(&self) -> bool {
        self.a & FLAG_A_EXTENSION != 0
    }

    /// Encode the four header bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[0] = self.a;
        out[1] = self.b;
        out[2..4].copy_from_slice(&self.seq.to_be_bytes());
        out
    }

    /// Decode the four header bytes.
    ///
    /// # Errors
    /// Returns [`RtpDecodeError::BufferTooSmall`] if fewer than 4 bytes remain.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        Ok(Self {
            a: buf[0],
            b: buf[1],
            seq: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }
}

/// Errors raised while decoding any AirTunes RTP-style packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtpDecodeError {
    /// Fewer bytes were available than the packet kind requires.
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall {
        /// Minimum size required.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// The payload-type byte did not match the packet kind being parsed; the
    /// packet is dropped by the caller, not treated as a hard error.
    #[error("unexpected payload type: 0x{0:02x}")]
    UnexpectedPayloadType(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = RtpHeader { a: 0x90, b: 0xd4, seq: 0x0007 };
        let bytes = h.encode();
        assert_eq!(RtpHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn payload_type_masks_marker_bit() {
        let h = RtpHeader { a: 0x80, b: 0xd3, seq: 7 };
        assert_eq!(h.payload_type(), 0x53);
        assert!(h.marker());
    }

    #[test]
    fn buffer_too_small_is_reported() {
        let err = RtpHeader::decode(&[0u8; 2]).unwrap_err();
        assert_eq!(err, RtpDecodeError::BufferTooSmall { needed: 4, have: 2 });
    }
}
