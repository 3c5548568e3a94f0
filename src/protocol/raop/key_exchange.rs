//! AES key material for RAOP audio encryption.
//!
//! Per the protocol's original design, the sender never performs a fresh
//! RSA-OAEP encryption per session: the `rsaaeskey`/`aesiv` pair shipped in
//! ANNOUNCE is a fixed, pre-computed blob (see [`crate::config`]) that every
//! receiver in the wild already accepts. This module just hands that pair
//! out alongside the raw AES key the CBC pass actually uses.

use super::super::crypto::CryptoError;
use crate::config;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// AES key size (128 bits)
pub const AES_KEY_SIZE: usize = 16;
/// AES IV size (128 bits)
pub const AES_IV_SIZE: usize = 16;

/// Session keys for RAOP audio encryption.
///
/// Despite the name, nothing here is negotiated per-session: every RSA
/// capable receiver accepts the same constant key/IV pair, so this struct
/// just decodes [`config::LEGACY_AES_KEY_B64`]/[`config::LEGACY_AES_IV_B64`]
/// once and carries the matching pre-encrypted blob for the SDP body.
#[derive(Clone)]
pub struct RaopSessionKeys {
    /// AES encryption key
    pub(crate) aes_key: [u8; AES_KEY_SIZE],
    /// AES initialization vector
    pub(crate) aes_iv: [u8; AES_IV_SIZE],
}

impl RaopSessionKeys {
    /// Build the fixed legacy session keys.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the compiled-in constants are not valid
    /// base64 or do not decode to 16 bytes (would indicate a packaging bug).
    pub fn generate() -> Result<Self, CryptoError> {
        let aes_key_vec = BASE64
            .decode(config::LEGACY_AES_KEY_B64.trim())
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))?;
        let aes_iv_vec = BASE64
            .decode(config::LEGACY_AES_IV_B64.trim())
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))?;

        if aes_key_vec.len() != AES_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_KEY_SIZE,
                actual: aes_key_vec.len(),
            });
        }
        if aes_iv_vec.len() != AES_IV_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_IV_SIZE,
                actual: aes_iv_vec.len(),
            });
        }

        let mut aes_key = [0u8; AES_KEY_SIZE];
        aes_key.copy_from_slice(&aes_key_vec);
        let mut aes_iv = [0u8; AES_IV_SIZE];
        aes_iv.copy_from_slice(&aes_iv_vec);

        Ok(Self { aes_key, aes_iv })
    }

    /// Get the AES key
    #[must_use]
    pub fn aes_key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.aes_key
    }

    /// Get the AES IV
    #[must_use]
    pub fn aes_iv(&self) -> &[u8; AES_IV_SIZE] {
        &self.aes_iv
    }

    /// The `rsaaeskey` SDP attribute value: the fixed RSA-encrypted blob,
    /// shipped verbatim.
    #[must_use]
    pub fn rsaaeskey(&self) -> String {
        config::LEGACY_RSA_AES_KEY_B64.to_string()
    }

    /// The `aesiv` SDP attribute value.
    #[must_use]
    pub fn aesiv(&self) -> String {
        config::LEGACY_AES_IV_B64.to_string()
    }
}

impl Drop for RaopSessionKeys {
    fn drop(&mut self) {
        self.aes_key.iter_mut().for_each(|b| *b = 0);
        self.aes_iv.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_decodes_fixed_constants() {
        let keys = RaopSessionKeys::generate().unwrap();
        assert_eq!(keys.aes_key().len(), AES_KEY_SIZE);
        assert_eq!(keys.aes_iv().len(), AES_IV_SIZE);
        assert_eq!(keys.rsaaeskey(), config::LEGACY_RSA_AES_KEY_B64);
        assert_eq!(keys.aesiv(), config::LEGACY_AES_IV_B64);
    }
}
