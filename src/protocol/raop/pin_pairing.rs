//! Pin-pairing and pair-verify for receivers that answer OPTIONS with 403.
//!
//! This implements Apple's non-standard SRP-6a variant used by the
//! `pair-pin-start`/`pair-setup-pin` POST endpoints (session key
//! `K = H(S‖0) ‖ H(S‖1)` instead of the RFC5054 `K = H(S)`, and an Ed25519
//! seed standing in for the usual random SRP private value), plus the
//! Curve25519-based `pair-verify` dance every connection repeats once a
//! device has already been paired.

use crate::protocol::crypto::{
    Aes128Ctr, Aes128Gcm, CryptoError, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature,
    X25519KeyPair, X25519PublicKey,
};
use crate::protocol::plist::PlistValue;
use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use zeroize::Zeroize;

const PRIME_2048_HEX: &str = "\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";
const PRIME_2048_GEN: u32 = 5;
const PAD_LEN: usize = 384;

fn pad(bytes: &[u8]) -> Vec<u8> {
    let mut padded = vec![0u8; PAD_LEN];
    padded[PAD_LEN - bytes.len()..].copy_from_slice(bytes);
    padded
}

/// Client side of Apple's pin-pairing SRP-6a variant.
///
/// The SRP private value `a` is derived from the device's persisted Ed25519
/// seed (`auth_secret`) rather than chosen randomly, so that a repeated
/// pin-pairing attempt against the same receiver is reproducible.
pub struct AtvSrpClient {
    n: BigUint,
    g: BigUint,
    k: BigUint,
    a: BigUint,
    public_key: Vec<u8>,
}

impl AtvSrpClient {
    /// Build a client keyed off an Ed25519 seed.
    ///
    /// # Errors
    /// Returns `CryptoError::SrpError` if the compiled-in prime fails to parse.
    pub fn new(auth_secret_seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let n = BigUint::parse_bytes(PRIME_2048_HEX.as_bytes(), 16)
            .ok_or_else(|| CryptoError::SrpError("failed to parse N".to_string()))?;
        let g = BigUint::from(PRIME_2048_GEN);

        let k = {
            let mut hasher = Sha512::new();
            hasher.update(n.to_bytes_be());
            hasher.update(pad(&g.to_bytes_be()));
            BigUint::from_bytes_be(&hasher.finalize())
        };

        let a = BigUint::from_bytes_be(auth_secret_seed) % &n;
        let a_pub = g.modpow(&a, &n);
        let public_key = pad(&a_pub.to_bytes_be());

        Ok(Self {
            n,
            g,
            k,
            a,
            public_key,
        })
    }

    /// The client's public SRP value `A`, padded to 384 bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Process the server's `{pk, salt}` challenge, producing a verifier
    /// that can emit the client proof and check the server's.
    ///
    /// # Errors
    /// Returns `CryptoError::SrpError` if `server_public` is degenerate (`B mod N == 0`).
    pub fn process_challenge(
        &self,
        username: &[u8],
        pin: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<AtvSrpVerifier, CryptoError> {
        let b_pub = BigUint::from_bytes_be(server_public);
        if (&b_pub % &self.n).is_zero() {
            return Err(CryptoError::SrpError("invalid server public key".to_string()));
        }

        let u = {
            let mut hasher = Sha512::new();
            hasher.update(&self.public_key);
            hasher.update(pad(&b_pub.to_bytes_be()));
            BigUint::from_bytes_be(&hasher.finalize())
        };

        let x = {
            let mut inner = Sha512::new();
            inner.update(username);
            inner.update(b":");
            inner.update(pin);
            let h_up = inner.finalize();

            let mut outer = Sha512::new();
            outer.update(salt);
            outer.update(h_up);
            BigUint::from_bytes_be(&outer.finalize())
        };

        let g_x = self.g.modpow(&x, &self.n);
        let k_g_x = (&self.k * g_x) % &self.n;
        let base = if b_pub >= k_g_x {
            (&b_pub - &k_g_x) % &self.n
        } else {
            (&self.n - (&k_g_x - &b_pub) % &self.n) % &self.n
        };

        let exp = &self.a + (&u * x);
        let s_shared = base.modpow(&exp, &self.n);
        let s_bytes = s_shared.to_bytes_be();

        // AtvSRPContext: K = H(S || 0x00000000) || H(S || 0x00000001)
        let k_session = {
            let mut first = Sha512::new();
            first.update(&s_bytes);
            first.update([0u8, 0, 0, 0]);
            let h0 = first.finalize();

            let mut second = Sha512::new();
            second.update(&s_bytes);
            second.update([0u8, 0, 0, 1]);
            let h1 = second.finalize();

            let mut combined = Vec::with_capacity(h0.len() + h1.len());
            combined.extend_from_slice(&h0);
            combined.extend_from_slice(&h1);
            combined
        };

        let m1 = {
            let hn = Sha512::digest(self.n.to_bytes_be());
            let hg = Sha512::digest(self.g.to_bytes_be());
            let mut hn_xor_hg = [0u8; 64];
            for i in 0..64 {
                hn_xor_hg[i] = hn[i] ^ hg[i];
            }
            let h_user = Sha512::digest(username);

            let mut hasher = Sha512::new();
            hasher.update(hn_xor_hg);
            hasher.update(h_user);
            hasher.update(salt);
            hasher.update(&self.public_key);
            hasher.update(pad(&b_pub.to_bytes_be()));
            hasher.update(&k_session);
            hasher.finalize().to_vec()
        };

        Ok(AtvSrpVerifier {
            a_pub: self.public_key.clone(),
            s_bytes,
            m1,
            k_session,
        })
    }
}

/// Verifier state produced by [`AtvSrpClient::process_challenge`].
pub struct AtvSrpVerifier {
    a_pub: Vec<u8>,
    /// Raw shared secret `S`, needed to derive the pair-setup-pin step 3
    /// AES-GCM key/IV.
    s_bytes: Vec<u8>,
    m1: Vec<u8>,
    k_session: Vec<u8>,
}

impl AtvSrpVerifier {
    /// The client's SRP proof `M1`, sent as `proof` in the second
    /// `pair-setup-pin` request.
    #[must_use]
    pub fn client_proof(&self) -> &[u8] {
        &self.m1
    }

    /// Verify the server's `M2` proof.
    ///
    /// # Errors
    /// Returns `CryptoError::VerificationFailed` if the proof does not match.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<(), CryptoError> {
        let mut hasher = Sha512::new();
        hasher.update(&self.a_pub);
        hasher.update(&self.m1);
        hasher.update(&self.k_session);
        let expected = hasher.finalize();

        if expected.as_slice() == server_proof {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    /// Key/IV pair for the step-3 `{epk, authTag}` AES-GCM envelope:
    /// `key = SHA512("Pair-Setup-AES-Key" || S)[0:16]`,
    /// `iv = SHA512("Pair-Setup-AES-IV" || S)[0:16]` with the final byte
    /// incremented by one.
    #[must_use]
    pub fn setup_aes_key_iv(&self) -> ([u8; 16], [u8; 16]) {
        let mut key_hasher = Sha512::new();
        key_hasher.update(b"Pair-Setup-AES-Key");
        key_hasher.update(&self.s_bytes);
        let key_hash = key_hasher.finalize();

        let mut iv_hasher = Sha512::new();
        iv_hasher.update(b"Pair-Setup-AES-IV");
        iv_hasher.update(&self.s_bytes);
        let iv_hash = iv_hasher.finalize();

        let mut key = [0u8; 16];
        key.copy_from_slice(&key_hash[..16]);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&iv_hash[..16]);
        iv[15] = iv[15].wrapping_add(1);

        (key, iv)
    }
}

impl Drop for AtvSrpVerifier {
    fn drop(&mut self) {
        self.s_bytes.zeroize();
        self.k_session.zeroize();
    }
}

/// Build the `{user, method: "pin"}` plist body for the first
/// `pair-setup-pin` request.
#[must_use]
pub fn pair_setup_pin_request_plist(user: &str) -> PlistValue {
    let mut dict = HashMap::new();
    dict.insert("user".to_string(), PlistValue::String(user.to_string()));
    dict.insert("method".to_string(), PlistValue::String("pin".to_string()));
    PlistValue::Dictionary(dict)
}

/// Build the `{pk, proof}` plist body for the second `pair-setup-pin` request.
#[must_use]
pub fn pair_setup_pin_proof_plist(public_key: &[u8], proof: &[u8]) -> PlistValue {
    let mut dict = HashMap::new();
    dict.insert("pk".to_string(), PlistValue::Data(public_key.to_vec()));
    dict.insert("proof".to_string(), PlistValue::Data(proof.to_vec()));
    PlistValue::Dictionary(dict)
}

/// Build the `{epk, authTag}` plist body for the third `pair-setup-pin`
/// request, AES-GCM-encrypting `our_ed25519_public` under the key/IV derived
/// from the SRP shared secret.
///
/// # Errors
/// Returns `CryptoError` if the GCM encryption fails.
pub fn pair_setup_pin_encrypted_plist(
    verifier: &AtvSrpVerifier,
    our_ed25519_public: &[u8; 32],
) -> Result<PlistValue, CryptoError> {
    let (key, iv) = verifier.setup_aes_key_iv();
    let cipher = Aes128Gcm::new(&key)?;
    // The 16-byte IV derived above is truncated to the 12-byte nonce GCM expects.
    let mut ciphertext = cipher.encrypt(&iv[..12], our_ed25519_public)?;
    // `Aes128Gcm::encrypt` appends the 16-byte tag; split it into `authTag`.
    let auth_tag = ciphertext.split_off(ciphertext.len() - 16);

    let mut dict = HashMap::new();
    dict.insert("epk".to_string(), PlistValue::Data(ciphertext));
    dict.insert("authTag".to_string(), PlistValue::Data(auth_tag));
    Ok(PlistValue::Dictionary(dict))
}

/// Extracts the `pk`/`salt` byte fields from a `pair-setup-pin` response plist.
#[must_use]
pub fn extract_pk_salt(plist: &PlistValue) -> Option<(Vec<u8>, Vec<u8>)> {
    let dict = plist.as_dict()?;
    let pk = dict.get("pk")?.as_bytes()?.to_vec();
    let salt = dict.get("salt")?.as_bytes()?.to_vec();
    Some((pk, salt))
}

/// Extracts the server's SRP proof from the second `pair-setup-pin` response.
#[must_use]
pub fn extract_proof(plist: &PlistValue) -> Option<Vec<u8>> {
    plist.as_dict()?.get("proof")?.as_bytes().map(<[u8]>::to_vec)
}

/// Session state for the `pair-verify` handshake, run on every connection to
/// a receiver for which pairing credentials already exist.
pub struct PairVerifyState {
    curve: X25519KeyPair,
    ed25519: Ed25519KeyPair,
}

impl PairVerifyState {
    /// Generate fresh ephemeral keys; `ed25519_seed` is the persisted
    /// `auth_secret` established during pin-pairing.
    #[must_use]
    pub fn new(ed25519_seed: &[u8; 32]) -> Result<Self, CryptoError> {
        Ok(Self {
            curve: X25519KeyPair::generate(),
            ed25519: Ed25519KeyPair::from_bytes(ed25519_seed)?,
        })
    }

    /// First `pair-verify` request body: `0x01000000 || our_curve_pub || our_ed25519_pub`.
    #[must_use]
    pub fn first_request_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(4 + 32 + 32);
        body.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        body.extend_from_slice(self.curve.public_key().as_bytes());
        body.extend_from_slice(self.ed25519.public_key().as_bytes());
        body
    }

    /// Given the receiver's 32-byte Curve25519 public key from the first
    /// response, derive the shared secret and build the second request's
    /// encrypted-signature body: `0x00000000 || AES-CTR(signature)`.
    ///
    /// # Errors
    /// Returns `CryptoError` if the peer public key is malformed.
    pub fn second_request_body(&self, atv_curve_pub: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let atv_pub = X25519PublicKey::from_bytes(atv_curve_pub)?;
        let shared = self.curve.diffie_hellman(&atv_pub);

        let mut signed = Vec::with_capacity(64);
        signed.extend_from_slice(self.curve.public_key().as_bytes());
        signed.extend_from_slice(atv_curve_pub);
        let signature: Ed25519Signature = self.ed25519.sign(&signed);

        let key_material = Sha512::digest(shared.as_bytes());
        let mut key = [0u8; 16];
        key.copy_from_slice(&key_material[..16]);
        // One-shot use per handshake; a fixed IV is safe here because the
        // key itself is derived fresh from an ephemeral DH exchange.
        let iv = [0u8; 16];

        let mut cipher = Aes128Ctr::new(&key, &iv)?;
        let mut ciphertext = signature.to_bytes().to_vec();
        cipher.apply_keystream(&mut ciphertext);

        let mut body = Vec::with_capacity(4 + ciphertext.len());
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        body.extend_from_slice(&ciphertext);
        Ok(body)
    }
}

/// Extracts the receiver's ephemeral Curve25519 public key (first 32 bytes)
/// from a `pair-verify` first-step response.
#[must_use]
pub fn extract_atv_curve_public(response_body: &[u8]) -> Option<&[u8]> {
    response_body.get(..32)
}
