//! Receiver data model: identity, negotiated capabilities,
//! handshake-derived state, auth state, and RTSP status.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::protocol::rtsp::DigestInfo;

/// RTSP status a receiver progresses through. Reuses the handshake state
/// enum the RTSP client already tracks rather than duplicating it.
pub type RtspStatus = crate::protocol::raop::RaopSessionState;

/// Audio codec a receiver advertises support for, parsed from the `cn` TXT
/// field (`0`=PCM, `1`=ALAC, `2`=AAC, `3`=AAC-ELD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecSupport {
    /// Uncompressed PCM.
    Pcm,
    /// Apple Lossless — the only codec this sender ever emits.
    Alac,
    /// AAC-LC.
    Aac,
    /// AAC-ELD.
    AacEld,
}

/// Encryption scheme a receiver advertises support for, parsed from the
/// `et` TXT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionSupport {
    /// No payload encryption.
    None,
    /// RSA-negotiated AES-CBC — the only scheme this sender implements.
    Rsa,
    /// `FairPlay` DRM (unsupported; see non-goals).
    FairPlay,
    /// MFiSAP (unsupported).
    MfiSap,
    /// `FairPlay` 2.5 (unsupported).
    FairPlay25,
}

/// Capabilities negotiated from a receiver's mDNS TXT record.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Codecs the receiver accepts; empty means "unknown, assume ALAC".
    pub codecs: Vec<CodecSupport>,
    /// Encryption schemes the receiver accepts.
    pub encryption: Vec<EncryptionSupport>,
}

impl Capabilities {
    /// Whether this sender can stream to the receiver at all.
    #[must_use]
    pub fn supports_alac(&self) -> bool {
        self.codecs.is_empty() || self.codecs.contains(&CodecSupport::Alac)
    }

    /// Whether RSA-negotiated AES-CBC should be applied to this receiver's
    /// audio payload.
    #[must_use]
    pub fn requires_rsa_encryption(&self) -> bool {
        self.encryption.contains(&EncryptionSupport::Rsa)
    }

    /// Whether the receiver demands a DRM scheme this sender cannot satisfy.
    #[must_use]
    pub fn requires_unsupported_encryption(&self) -> bool {
        !self.encryption.is_empty()
            && self
                .encryption
                .iter()
                .all(|e| matches!(e, EncryptionSupport::FairPlay | EncryptionSupport::MfiSap | EncryptionSupport::FairPlay25))
    }
}

/// Ed25519 seed used for both legacy pin-pairing and pair-verify, plus the
/// identifier the receiver stores it under. Persistence is the caller's
/// concern; this crate only carries the bytes between a completed pairing
/// and the next connection attempt.
pub struct Credentials {
    /// Opaque identifier the receiver associates with `auth_secret`.
    pub auth_identifier: String,
    /// 32-byte Ed25519 seed.
    pub auth_secret: [u8; 32],
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self { auth_identifier: self.auth_identifier.clone(), auth_secret: self.auth_secret }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("auth_identifier", &self.auth_identifier).finish_non_exhaustive()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.auth_secret.zeroize();
    }
}

/// One discovered or manually-configured AirTunes receiver.
///
/// Owned by the RTSP client; referenced by the group controller.
#[derive(Debug, Clone)]
pub struct Receiver {
    /// mDNS service instance name (`{MAC}@{device name}`), or a synthetic
    /// name for manually-added receivers.
    pub service_name: String,
    /// Advertised hostname, if known.
    pub hostname: Option<String>,
    /// IPv4 address.
    pub address: Ipv4Addr,
    /// RTSP port.
    pub port: u16,
    /// Negotiated capabilities.
    pub capabilities: Capabilities,

    /// Handshake-derived session ID (from the RTSP `Session` header).
    pub session_id: Option<String>,
    /// Handshake-derived audio data port.
    pub server_port: Option<u16>,
    /// Handshake-derived control port.
    pub control_port: Option<u16>,
    /// Handshake-derived timing port.
    pub timing_port: Option<u16>,
    /// Jitter-buffer latency the receiver reported in RECORD's
    /// `Audio-Latency` header. Parsed for observation only — see the
    /// design note on `RAOP_LATENCY_MIN`.
    pub audio_latency: Option<u32>,

    /// Password used on the most recent successful digest authentication,
    /// cached so `repair_connection` can replay it.
    pub last_password: Option<String>,
    /// Pin-pairing credentials, cached so `repair_connection` can replay
    /// pair-verify without re-running pair-setup.
    pub last_credentials: Option<Credentials>,
    /// Digest challenge parameters from the most recent 401, cached so a
    /// retried request can attach `Authorization` immediately.
    pub digest_info: Option<DigestInfo>,

    /// Current RTSP status.
    pub status: RtspStatus,

    /// The local UDP port this sender's control socket used the last time
    /// it sent this receiver a SETUP request, so `repair_connection` can
    /// re-advertise the same port.
    pub client_control_port: Option<u16>,
    /// As above, for the timing socket.
    pub client_timing_port: Option<u16>,
}

impl Receiver {
    /// Construct a receiver from its discovered identity. Capabilities
    /// default empty (treated as "ALAC, no encryption" until TXT parsing
    /// fills them in).
    #[must_use]
    pub fn new(service_name: impl Into<String>, address: Ipv4Addr, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            hostname: None,
            address,
            port,
            capabilities: Capabilities::default(),
            session_id: None,
            server_port: None,
            control_port: None,
            timing_port: None,
            audio_latency: None,
            last_password: None,
            last_credentials: None,
            digest_info: None,
            status: RtspStatus::Closed,
            client_control_port: None,
            client_timing_port: None,
        }
    }

    /// The RTSP socket address.
    #[must_use]
    pub fn rtsp_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    /// Whether audio should currently be sent to this receiver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == RtspStatus::Playing
    }

    /// The receiver's audio data socket address, once SETUP has completed.
    #[must_use]
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_port.map(|p| SocketAddr::V4(SocketAddrV4::new(self.address, p)))
    }

    /// The receiver's control socket address, once SETUP has completed.
    #[must_use]
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_port.map(|p| SocketAddr::V4(SocketAddrV4::new(self.address, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_receiver_starts_closed_and_disconnected() {
        let r = Receiver::new("AABBCCDDEEFF@Kitchen", Ipv4Addr::new(192, 168, 1, 10), 5000);
        assert_eq!(r.status, RtspStatus::Closed);
        assert!(!r.is_connected());
        assert!(r.server_addr().is_none());
    }

    #[test]
    fn empty_capabilities_assume_alac_no_encryption() {
        let caps = Capabilities::default();
        assert!(caps.supports_alac());
        assert!(!caps.requires_rsa_encryption());
        assert!(!caps.requires_unsupported_encryption());
    }

    #[test]
    fn fairplay_only_is_unsupported() {
        let caps = Capabilities { codecs: vec![], encryption: vec![EncryptionSupport::FairPlay] };
        assert!(caps.requires_unsupported_encryption());
    }

    #[test]
    fn rsa_capability_is_detected() {
        let caps = Capabilities {
            codecs: vec![CodecSupport::Alac],
            encryption: vec![EncryptionSupport::None, EncryptionSupport::Rsa],
        };
        assert!(caps.requires_rsa_encryption());
        assert!(!caps.requires_unsupported_encryption());
    }

    #[test]
    fn connected_iff_playing() {
        let mut r = Receiver::new("x", Ipv4Addr::LOCALHOST, 5000);
        r.status = RtspStatus::Playing;
        assert!(r.is_connected());
        r.status = RtspStatus::Flush;
        assert!(!r.is_connected());
    }
}
