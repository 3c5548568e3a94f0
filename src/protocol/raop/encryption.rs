//! RAOP audio encryption: AES-128-CBC over the ALAC payload.
//!
//! Every audio packet is encrypted independently from the same key/IV
//! negotiated once via ANNOUNCE — there is no per-packet IV derivation or
//! running keystream, matching every RSA-capable receiver in the wild. Only
//! whole 16-byte blocks of the payload are encrypted; a trailing partial
//! block (ALAC frames are rarely a multiple of 16 bytes) is left in the
//! clear.

use crate::protocol::crypto::{Aes128Cbc, CryptoError};
use crate::protocol::raop::key_exchange::RaopSessionKeys;

/// AES key size (128 bits)
pub const AES_KEY_SIZE: usize = 16;
/// AES IV size (128 bits)
pub const AES_IV_SIZE: usize = 16;

/// RAOP audio encryptor.
///
/// Handles AES-128-CBC encryption of ALAC payloads.
pub struct RaopEncryptor {
    /// AES encryption key
    key: [u8; AES_KEY_SIZE],
    /// Initialization vector, reused unchanged for every packet
    iv: [u8; AES_IV_SIZE],
    /// Whether encryption is enabled
    enabled: bool,
}

impl RaopEncryptor {
    /// Create a new encryptor with given key and IV
    #[must_use]
    pub fn new(key: [u8; AES_KEY_SIZE], iv: [u8; AES_IV_SIZE]) -> Self {
        Self {
            key,
            iv,
            enabled: true,
        }
    }

    /// Create an encryptor with encryption disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            key: [0; AES_KEY_SIZE],
            iv: [0; AES_IV_SIZE],
            enabled: false,
        }
    }

    /// Check if encryption is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Encrypt an ALAC payload, returning a new buffer.
    ///
    /// # Errors
    /// Returns `CryptoError` if the configured key/IV are malformed.
    pub fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut output = payload.to_vec();
        self.encrypt_in_place(&mut output)?;
        Ok(output)
    }

    /// Encrypt an ALAC payload in place.
    ///
    /// # Errors
    /// Returns `CryptoError` if the configured key/IV are malformed.
    pub fn encrypt_in_place(&self, payload: &mut [u8]) -> Result<(), CryptoError> {
        if !self.enabled {
            return Ok(());
        }

        let cipher = Aes128Cbc::new(&self.key, &self.iv)?;
        cipher.encrypt_in_place(payload);
        Ok(())
    }

    /// Get a reference to the key (for session info)
    #[must_use]
    pub fn key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.key
    }

    /// Get a reference to the IV
    #[must_use]
    pub fn iv(&self) -> &[u8; AES_IV_SIZE] {
        &self.iv
    }
}

impl Drop for RaopEncryptor {
    fn drop(&mut self) {
        self.key.iter_mut().for_each(|b| *b = 0);
        self.iv.iter_mut().for_each(|b| *b = 0);
    }
}

/// Encryption mode for a RAOP session, as advertised in mDNS TXT records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// No encryption (et=0 in TXT records)
    None,
    /// RSA encryption (et=1)
    Rsa,
    /// `FairPlay` encryption (et=3, not supported)
    FairPlay,
    /// MFi-SAP encryption (et=4, not supported)
    MfiSap,
    /// `FairPlay` SAPv2.5 (et=5, not supported)
    FairPlaySap25,
}

impl EncryptionMode {
    /// Parse from TXT record value
    #[must_use]
    pub fn from_txt(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Rsa),
            3 => Some(Self::FairPlay),
            4 => Some(Self::MfiSap),
            5 => Some(Self::FairPlaySap25),
            _ => None,
        }
    }

    /// Check if this mode is supported
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::None | Self::Rsa)
    }
}

/// Session encryption configuration, bound to a single receiver.
pub struct EncryptionConfig {
    /// Encryption mode
    pub mode: EncryptionMode,
    /// Encryptor (if encryption enabled)
    encryptor: Option<RaopEncryptor>,
    /// Session keys (if encryption enabled)
    keys: Option<RaopSessionKeys>,
}

impl EncryptionConfig {
    /// Create unencrypted configuration
    #[must_use]
    pub fn unencrypted() -> Self {
        Self {
            mode: EncryptionMode::None,
            encryptor: Some(RaopEncryptor::disabled()),
            keys: None,
        }
    }

    /// Create RSA-capable configuration, using the fixed legacy key/IV.
    ///
    /// # Errors
    /// Returns `CryptoError` if the compiled-in key material is malformed.
    pub fn rsa() -> Result<Self, CryptoError> {
        let keys = RaopSessionKeys::generate()?;
        let encryptor = RaopEncryptor::new(*keys.aes_key(), *keys.aes_iv());

        Ok(Self {
            mode: EncryptionMode::Rsa,
            encryptor: Some(encryptor),
            keys: Some(keys),
        })
    }

    /// Get encryptor
    #[must_use]
    pub fn encryptor(&self) -> Option<&RaopEncryptor> {
        self.encryptor.as_ref()
    }

    /// Get session keys for SDP
    #[must_use]
    pub fn session_keys(&self) -> Option<&RaopSessionKeys> {
        self.keys.as_ref()
    }

    /// Check if encryption is active
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.mode != EncryptionMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_encryptor_is_passthrough() {
        let enc = RaopEncryptor::disabled();
        let data = vec![1u8, 2, 3, 4, 5];
        assert_eq!(enc.encrypt(&data).unwrap(), data);
    }

    #[test]
    fn partial_trailing_block_is_left_plaintext() {
        let enc = RaopEncryptor::new([7u8; AES_KEY_SIZE], [9u8; AES_IV_SIZE]);
        let mut data = vec![0xAAu8; 20];
        let tail = data[16..].to_vec();
        enc.encrypt_in_place(&mut data).unwrap();
        assert_eq!(&data[16..], tail.as_slice());
        assert_ne!(&data[..16], &[0xAAu8; 16]);
    }

    #[test]
    fn same_iv_reused_every_call_is_deterministic() {
        let enc = RaopEncryptor::new([1u8; AES_KEY_SIZE], [2u8; AES_IV_SIZE]);
        let data = vec![5u8; 32];
        assert_eq!(enc.encrypt(&data).unwrap(), enc.encrypt(&data).unwrap());
    }

    #[test]
    fn encryption_mode_rsa_bit_is_supported() {
        assert!(EncryptionMode::from_txt(1).unwrap().is_supported());
        assert!(!EncryptionMode::from_txt(3).unwrap().is_supported());
        assert_eq!(EncryptionMode::from_txt(9), None);
    }
}
