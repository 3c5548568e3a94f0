//! RAOP (`AirPlay` 1) protocol implementation

pub mod auth;
pub mod encryption;
pub mod key_exchange;
pub mod pin_pairing;
pub mod session;

pub use auth::{
    CHALLENGE_SIZE, RaopAuthenticator, decode_challenge, encode_challenge, generate_challenge,
};

pub use encryption::{AES_IV_SIZE, AES_KEY_SIZE, EncryptionConfig, EncryptionMode, RaopEncryptor};

pub use key_exchange::RaopSessionKeys;

pub use pin_pairing::{
    AtvSrpClient, AtvSrpVerifier, PairVerifyState, extract_atv_curve_public, extract_pk_salt,
    extract_proof, pair_setup_pin_encrypted_plist, pair_setup_pin_proof_plist,
    pair_setup_pin_request_plist,
};

pub use session::{RaopRtspSession, RaopSessionState, RaopTransport, SetParameterKind};
