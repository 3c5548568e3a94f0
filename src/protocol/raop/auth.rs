//! Apple-Challenge / Apple-Response header plumbing for OPTIONS.
//!
//! The sender only ever generates the challenge and reads back whether the
//! receiver answered with an `Apple-Response` header; it never verifies an
//! RSA signature against a known public key (that verification belongs to
//! the receiver role, not the sender).

use super::super::crypto::CryptoError;
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD as BASE64};

/// Challenge size in bytes (128 bits)
pub const CHALLENGE_SIZE: usize = 16;

/// Generate a random Apple-Challenge
#[must_use]
pub fn generate_challenge() -> [u8; CHALLENGE_SIZE] {
    use rand::RngCore;

    let mut challenge = [0u8; CHALLENGE_SIZE];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}

/// Encode challenge as Base64 for the `Apple-Challenge` header
#[must_use]
pub fn encode_challenge(challenge: &[u8]) -> String {
    BASE64.encode(challenge)
}

/// Decode challenge from an `Apple-Challenge` header value
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` if the input is not valid base64.
pub fn decode_challenge(header: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(header.trim())
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))
}

/// Tracks the Apple-Challenge this sender attaches to each OPTIONS request.
///
/// A fresh challenge is minted lazily on first use and reused for the
/// lifetime of the session; `mark_sent()` only records that the challenge
/// has gone out on the wire, since OPTIONS may be retried before a response
/// arrives.
#[derive(Debug, Clone)]
pub struct RaopAuthenticator {
    challenge: [u8; CHALLENGE_SIZE],
    sent: bool,
}

impl RaopAuthenticator {
    /// Create a new authenticator with a freshly generated challenge.
    #[must_use]
    pub fn new() -> Self {
        Self { challenge: generate_challenge(), sent: false }
    }

    /// The `Apple-Challenge` header value to attach to the next OPTIONS
    /// request.
    #[must_use]
    pub fn challenge_header(&self) -> String {
        encode_challenge(&self.challenge)
    }

    /// Record that the challenge carrying request has been sent.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Whether the challenge has been sent at least once.
    #[must_use]
    pub fn was_sent(&self) -> bool {
        self.sent
    }

    /// The raw challenge bytes, for tests or future Apple-Response checks.
    #[must_use]
    pub fn challenge(&self) -> &[u8; CHALLENGE_SIZE] {
        &self.challenge
    }
}

impl Default for RaopAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_round_trips_through_base64() {
        let challenge = generate_challenge();
        let encoded = encode_challenge(&challenge);
        let decoded = decode_challenge(&encoded).unwrap();
        assert_eq!(decoded, challenge);
    }

    #[test]
    fn generated_challenges_differ() {
        assert_ne!(generate_challenge(), generate_challenge());
    }

    #[test]
    fn authenticator_challenge_header_decodes_back_to_its_bytes() {
        let auth = RaopAuthenticator::new();
        let decoded = decode_challenge(&auth.challenge_header()).unwrap();
        assert_eq!(decoded.as_slice(), auth.challenge());
    }

    #[test]
    fn authenticator_tracks_whether_it_has_been_sent() {
        let mut auth = RaopAuthenticator::new();
        assert!(!auth.was_sent());
        auth.mark_sent();
        assert!(auth.was_sent());
    }
}
