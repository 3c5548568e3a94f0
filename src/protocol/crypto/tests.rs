use super::*;

// --- aes.rs tests ---

#[test]
fn test_aes_ctr_encrypt_decrypt() {
    let key = [0x42u8; 16];
    let iv = [0x00u8; 16];

    let mut cipher1 = Aes128Ctr::new(&key, &iv).unwrap();
    let mut cipher2 = Aes128Ctr::new(&key, &iv).unwrap();

    let plaintext = b"Hello, AirPlay audio!";
    let ciphertext = cipher1.process(plaintext);

    assert_ne!(&ciphertext, plaintext);

    let decrypted = cipher2.process(&ciphertext);
    assert_eq!(decrypted, plaintext);
}

#[test]
fn test_aes_ctr_in_place() {
    let key = [0x42u8; 16];
    let iv = [0x00u8; 16];

    let mut cipher = Aes128Ctr::new(&key, &iv).unwrap();

    let mut data = b"test data".to_vec();
    let original = data.clone();

    cipher.apply_keystream(&mut data);
    assert_ne!(data, original);

    // Reset cipher and decrypt
    let mut cipher = Aes128Ctr::new(&key, &iv).unwrap();
    cipher.apply_keystream(&mut data);
    assert_eq!(data, original);
}

#[test]
fn test_aes_gcm_encrypt_decrypt() {
    let key = [0x42u8; 16];
    let nonce = [0x00u8; 12];

    let cipher = Aes128Gcm::new(&key).unwrap();

    let plaintext = b"Secret audio data";
    let ciphertext = cipher.encrypt(&nonce, plaintext).unwrap();
    let decrypted = cipher.decrypt(&nonce, &ciphertext).unwrap();

    assert_eq!(decrypted, plaintext);
}

#[test]
fn test_aes_gcm_tamper_detection() {
    let key = [0x42u8; 16];
    let nonce = [0x00u8; 12];

    let cipher = Aes128Gcm::new(&key).unwrap();

    let mut ciphertext = cipher.encrypt(&nonce, b"data").unwrap();
    ciphertext[0] ^= 0xFF; // Tamper with ciphertext

    let result = cipher.decrypt(&nonce, &ciphertext);
    assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
}

// --- ed25519.rs tests ---

#[test]
fn test_ed25519_keypair_generation() {
    let kp = Ed25519KeyPair::generate();
    let pk = kp.public_key();

    assert_eq!(pk.as_bytes().len(), 32);
}

#[test]
fn test_ed25519_keypair_from_bytes() {
    let kp1 = Ed25519KeyPair::generate();
    let secret = kp1.secret_bytes();

    let kp2 = Ed25519KeyPair::from_bytes(&secret).unwrap();

    assert_eq!(kp1.public_key().as_bytes(), kp2.public_key().as_bytes());
}

#[test]
fn test_ed25519_sign_verify() {
    let kp = Ed25519KeyPair::generate();
    let message = b"test message";

    let signature = kp.sign(message);
    kp.public_key().verify(message, &signature).unwrap();
}

#[test]
fn test_ed25519_verify_wrong_message() {
    let kp = Ed25519KeyPair::generate();

    let signature = kp.sign(b"original message");
    let result = kp.public_key().verify(b"different message", &signature);

    assert!(matches!(result, Err(CryptoError::InvalidSignature)));
}

#[test]
fn test_ed25519_signature_roundtrip() {
    let kp = Ed25519KeyPair::generate();
    let signature = kp.sign(b"message");

    let bytes = signature.to_bytes();
    let recovered = Ed25519Signature::from_bytes(&bytes).unwrap();

    kp.public_key().verify(b"message", &recovered).unwrap();
}

// --- x25519.rs tests ---

#[test]
fn test_x25519_key_exchange() {
    let alice = X25519KeyPair::generate();
    let bob = X25519KeyPair::generate();

    let alice_shared = alice.diffie_hellman(&bob.public_key());
    let bob_shared = bob.diffie_hellman(&alice.public_key());

    assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
}

#[test]
fn test_x25519_keypair_roundtrip() {
    let kp1 = X25519KeyPair::generate();
    let secret = kp1.secret_bytes();

    let kp2 = X25519KeyPair::from_bytes(&secret).unwrap();

    assert_eq!(kp1.public_key().as_bytes(), kp2.public_key().as_bytes());
}

#[test]
fn test_x25519_public_key_from_bytes() {
    let kp = X25519KeyPair::generate();
    let pk_bytes = kp.public_key().as_bytes().to_vec();

    let pk = X25519PublicKey::from_bytes(&pk_bytes).unwrap();

    assert_eq!(pk.as_bytes(), kp.public_key().as_bytes());
}
