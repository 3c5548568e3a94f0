//! Resend request wire format: a receiver telling us it is missing one
//! audio sequence number.

use super::packet::{RtpDecodeError, RtpHeader};

/// `flags_b` payload-type byte for a resend request (marker bit set).
const FLAG_B: u8 = 0xD5;

/// Total wire size of a resend request.
pub const SIZE: usize = 8;

/// A receiver-initiated request for a missing audio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRequest {
    /// First missing sequence number.
    pub missed_seq: u16,
    /// Count of consecutive missing sequence numbers starting at `missed_seq`.
    pub count: u16,
}

impl ResendRequest {
    /// Decode from wire bytes.
    ///
    /// # Errors
    /// Returns [`RtpDecodeError::BufferTooSmall`] if fewer than [`SIZE`]
    /// bytes are available, or [`RtpDecodeError::UnexpectedPayloadType`] if
    /// the payload-type byte does not match `0x55`. Packets whose payload
    /// type does not match are dropped by the caller with a warning rather
    /// than treated as a hard protocol error.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < SIZE {
            return Err(RtpDecodeError::BufferTooSmall { needed: SIZE, have: buf.len() });
        }
        let header = RtpHeader::decode(buf)?;
        if header.payload_type() != FLAG_B & 0x7F {
            return Err(RtpDecodeError::UnexpectedPayloadType(header.b));
        }
        Ok(Self {
            missed_seq: u16::from_be_bytes([buf[4], buf[5]]),
            count: u16::from_be_bytes([buf[6], buf[7]]),
        })
    }

    /// Sequence numbers this request covers, for retransmit fan-out.
    pub fn sequence_range(&self) -> impl Iterator<Item = u16> + use<> {
        let start = self.missed_seq;
        let count = self.count.max(1);
        (0..count).map(move |i| start.wrapping_add(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(missed_seq: u16, count: u16) -> [u8; SIZE] {
        let header = RtpHeader { a: 0x80, b: FLAG_B, seq: 0 };
        let mut out = [0u8; SIZE];
        out[0..4].copy_from_slice(&header.encode());
        out[4..6].copy_from_slice(&missed_seq.to_be_bytes());
        out[6..8].copy_from_slice(&count.to_be_bytes());
        out
    }

    #[test]
    fn decodes_missed_seq_and_count() {
        let buf = bytes(1050, 1);
        let req = ResendRequest::decode(&buf).unwrap();
        assert_eq!(req.missed_seq, 1050);
        assert_eq!(req.count, 1);
    }

    #[test]
    fn sequence_range_covers_count() {
        let req = ResendRequest { missed_seq: 65535, count: 3 };
        let seqs: Vec<u16> = req.sequence_range().collect();
        assert_eq!(seqs, vec![65535, 0, 1]);
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let mut buf = bytes(1, 1);
        buf[1] = 0x60;
        assert!(matches!(
            ResendRequest::decode(&buf),
            Err(RtpDecodeError::UnexpectedPayloadType(_))
        ));
    }
}
