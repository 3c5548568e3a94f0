//! Error types for the AirTunes sender core.

use std::fmt;
use std::io;

/// Main error type returned by every public operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum AirTunesError {
    /// OPTIONS returned 401: the receiver requires a password (digest auth).
    #[error("receiver requires a password")]
    RequiresPassword,

    /// OPTIONS returned 403 and no credentials are cached for this receiver.
    #[error("receiver requires pin-code pairing")]
    RequiresPinCode,

    /// Digest authentication was attempted and rejected.
    #[error("wrong password")]
    WrongPassword,

    /// The PIN entered by the user did not match during pin-setup.
    #[error("wrong pin code")]
    WrongPinCode,

    /// Pin-pairing failed for a reason other than a wrong PIN (SRP proof
    /// mismatch, malformed plist, AES-GCM tag mismatch).
    #[error("pairing failed: {0}")]
    PairingFailed(String),

    /// Generic authentication failure (pair-verify signature mismatch, etc).
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Human-readable detail.
        message: String,
        /// Whether a retry with fresh credentials might succeed.
        recoverable: bool,
    },

    /// An operation that requires cached credentials was attempted without any.
    #[error("no credentials available for this receiver")]
    NoCredentials,

    /// RTSP 453 Not Enough Bandwidth.
    #[error("receiver reports insufficient bandwidth")]
    NotEnoughBandwidth,

    /// Any other non-success RTSP status outside the request's allowed set.
    #[error("unexpected RTSP response: {status} {reason}")]
    BadResponse {
        /// RTSP status code.
        status: u16,
        /// RTSP reason phrase.
        reason: String,
    },

    /// A request/response round trip did not complete within the configured
    /// timeout.
    #[error("request timed out after {duration_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        duration_ms: u64,
    },

    /// `add_receiver` called for a receiver already present in the group.
    #[error("receiver is already connected")]
    ClientAlreadyConnected,

    /// The receiver's advertised codec set has no entry this sender can emit.
    #[error("unsupported codec")]
    UnsupportedCodec,

    /// The receiver requires an encryption scheme this sender does not implement.
    #[error("unsupported encryption scheme")]
    UnsupportedEncryption,

    /// The PCM source file type is not recognized by the collaborator.
    #[error("unsupported file type")]
    UnsupportedFileType,

    /// An operation was attempted on a group whose status is `Closed`.
    #[error("group is closed")]
    GroupClosed,

    /// Transport-level I/O error (TCP/UDP).
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    /// An RTSP request/response violated protocol framing (bad status line,
    /// missing Content-Length, unterminated headers).
    #[error("RTSP protocol error: {message}")]
    RtspError {
        /// Human-readable detail.
        message: String,
        /// RTSP status code, if a response was actually received.
        status_code: Option<u16>,
    },

    /// An RTP packet failed to decode (wrong size, bad payload type).
    #[error("RTP protocol error: {0}")]
    RtpError(String),

    /// ALAC encode or AES encrypt/decrypt failure.
    #[error("codec error: {0}")]
    CodecError(String),

    /// A caller supplied an out-of-range or malformed parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An operation was attempted from a state that does not allow it (e.g.
    /// `resume()` while `Stopped`).
    #[error("invalid state: {message} (current state: {current_state})")]
    InvalidState {
        /// Human-readable detail.
        message: String,
        /// Debug-formatted current state, for diagnostics.
        current_state: String,
    },
}

impl AirTunesError {
    /// Whether the caller can reasonably retry the operation (possibly after
    /// supplying new credentials), as opposed to the connection simply being
    /// gone.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::RequiresPassword
            | Self::RequiresPinCode
            | Self::WrongPassword
            | Self::WrongPinCode
            | Self::NotEnoughBandwidth => true,
            Self::AuthenticationFailed { recoverable, .. } => *recoverable,
            _ => false,
        }
    }

    /// Whether this error indicates the underlying connection is gone and
    /// the receiver must be re-added from scratch.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::BadResponse { .. } | Self::RtspError { .. }
        )
    }

    /// Build an [`AirTunesError::InvalidState`] from any `Debug`-printable state.
    pub fn invalid_state(message: impl Into<String>, current_state: impl fmt::Debug) -> Self {
        Self::InvalidState {
            message: message.into(),
            current_state: format!("{current_state:?}"),
        }
    }

    /// Build an [`AirTunesError::BadResponse`] from an RTSP status/reason pair.
    #[must_use]
    pub fn bad_response(status: u16, reason: impl Into<String>) -> Self {
        Self::BadResponse {
            status,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AirTunesError>;
