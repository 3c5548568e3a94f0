//! Timing packet wire format: a 32-byte NTP round-trip probe exchanged
//! with every receiver's timing port.
//!
//! Requests (`0x52`) arrive from receivers; this sender only ever builds
//! responses (`0x53`). Both carry the marker bit set, so the wire byte is
//! `0xD2`/`0xD3` respectively.

use super::packet::{RtpDecodeError, RtpHeader};
use crate::clock::NtpTimestamp;

/// `flags_a`, constant for every timing packet.
const FLAG_A: u8 = 0x80;
/// `flags_b` for an incoming timing request.
const FLAG_B_REQUEST: u8 = 0xD2;
/// `flags_b` for an outgoing timing response.
const FLAG_B_RESPONSE: u8 = 0xD3;
/// The sequence field is constant for timing packets.
const SEQ: u16 = 0x0007;

/// Total wire size of a timing packet.
pub const SIZE: usize = 32;

/// A timing probe received from a receiver on our timing port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRequest {
    /// Time the receiver sent this request.
    pub send_time: NtpTimestamp,
}

impl TimingRequest {
    /// Decode from wire bytes.
    ///
    /// # Errors
    /// Returns [`RtpDecodeError::BufferTooSmall`] if fewer than [`SIZE`]
    /// bytes are available, or [`RtpDecodeError::UnexpectedPayloadType`] if
    /// the payload-type byte does not match `0x52`.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < SIZE {
            return Err(RtpDecodeError::BufferTooSmall { needed: SIZE, have: buf.len() });
        }
        let header = RtpHeader::decode(buf)?;
        if header.payload_type() != FLAG_B_REQUEST & 0x7F {
            return Err(RtpDecodeError::UnexpectedPayloadType(header.b));
        }
        let send_time = NtpTimestamp::decode(&buf[24..32].try_into().unwrap());
        Ok(Self { send_time })
    }
}

/// The timing response this sender builds and returns to the probing
/// receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingResponse {
    /// Echoes the request's `send_time`.
    pub reference_time: NtpTimestamp,
    /// Captured once, shared with `send_time` below.
    pub received_time: NtpTimestamp,
    /// Same instant as `received_time`, captured once.
    pub send_time: NtpTimestamp,
}

impl TimingResponse {
    /// Build a response to `request`, capturing "now" exactly once.
    #[must_use]
    pub fn answer(request: &TimingRequest) -> Self {
        let now = NtpTimestamp::now();
        Self {
            reference_time: request.send_time,
            received_time: now,
            send_time: now,
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; SIZE] {
        let header = RtpHeader { a: FLAG_A, b: FLAG_B_RESPONSE, seq: SEQ };
        let mut out = [0u8; SIZE];
        out[0..4].copy_from_slice(&header.encode());
        // bytes 4..8 are zero padding
        out[8..16].copy_from_slice(&self.reference_time.encode());
        out[16..24].copy_from_slice(&self.received_time.encode());
        out[24..32].copy_from_slice(&self.send_time.encode());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_bytes(send_time: NtpTimestamp) -> [u8; SIZE] {
        let header = RtpHeader { a: FLAG_A, b: FLAG_B_REQUEST, seq: SEQ };
        let mut out = [0u8; SIZE];
        out[0..4].copy_from_slice(&header.encode());
        out[24..32].copy_from_slice(&send_time.encode());
        out
    }

    #[test]
    fn request_decodes_send_time() {
        let send_time = NtpTimestamp { sec: 42, frac: 0x8000_0000 };
        let buf = request_bytes(send_time);
        let req = TimingRequest::decode(&buf).unwrap();
        assert_eq!(req.send_time, send_time);
    }

    #[test]
    fn response_echoes_request_send_time_as_reference() {
        let send_time = NtpTimestamp { sec: 42, frac: 0x8000_0000 };
        let req = TimingRequest { send_time };
        let resp = TimingResponse::answer(&req);
        assert_eq!(resp.reference_time, send_time);
        assert!(resp.received_time.sec <= resp.send_time.sec);
        assert_eq!(resp.received_time, resp.send_time);
    }

    #[test]
    fn response_wire_marker_byte_is_0xd3() {
        let req = TimingRequest { send_time: NtpTimestamp::ZERO };
        let resp = TimingResponse::answer(&req);
        let bytes = resp.encode();
        assert_eq!(bytes[1], 0xD3);
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let mut buf = request_bytes(NtpTimestamp::ZERO);
        buf[1] = 0xD5;
        assert!(matches!(
            TimingRequest::decode(&buf),
            Err(RtpDecodeError::UnexpectedPayloadType(_))
        ));
    }
}
