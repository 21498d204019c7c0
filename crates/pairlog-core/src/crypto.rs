//! Symmetric encryption layer using ChaCha20-Poly1305 AEAD
//!
//! Provides the pairwise shared key type and the nonce-prefixed encryption
//! format used for conversation log blobs. Key agreement lives in
//! [`crate::keys`]; this module only deals in the derived symmetric key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::error::ChatError;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"pairlog-shared-key-v1";

/// Pairwise symmetric key derived from the ECDH handshake.
///
/// Both parties derive the identical value independently; it is cached for
/// the lifetime of the process and never persisted or transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Wrap raw 32-byte key material.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from raw ECDH shared-secret bytes using HKDF-SHA256.
    pub fn from_ecdh_secret(shared_secret: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
        let mut output = [0u8; 32];
        hkdf.expand(HKDF_INFO, &mut output)
            .expect("HKDF expand should never fail with 32-byte output");
        Self(output)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("SharedKey").finish_non_exhaustive()
    }
}

/// Encryption utilities for conversation log blobs.
///
/// Holds a cipher instance initialized with a [`SharedKey`].
///
/// # Wire Format
///
/// Encrypted data format: `[nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)]`
pub struct LogCrypto {
    cipher: ChaCha20Poly1305,
}

impl LogCrypto {
    /// Create a new LogCrypto instance with the given shared key.
    pub fn new(key: &SharedKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt data, prepending a freshly drawn random nonce.
    ///
    /// A random nonce is generated for each encryption operation; the nonce
    /// must be unique per key, so it is never reused or derived from content.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ChatError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ChatError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data in the `[nonce (12 bytes)] + [ciphertext + tag]` format.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DecryptionFailed`] if the blob is too short to
    /// contain a nonce, or if the authentication tag does not verify
    /// (wrong key, corrupted storage, or tampering).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, ChatError> {
        if blob.len() < NONCE_SIZE {
            return Err(ChatError::DecryptionFailed(
                "Blob too short to contain nonce".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);
        let ciphertext = &blob[NONCE_SIZE..];

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| ChatError::DecryptionFailed(format!("{}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> SharedKey {
        SharedKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypto = LogCrypto::new(&test_key(7));

        let plaintext = b"Hello, World!";
        let blob = crypto.encrypt(plaintext).unwrap();
        let decrypted = crypto.decrypt(&blob).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let crypto = LogCrypto::new(&test_key(7));

        let blob = crypto.encrypt(b"").unwrap();
        let decrypted = crypto.decrypt(&blob).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_blob_includes_nonce_and_tag() {
        let crypto = LogCrypto::new(&test_key(7));

        let plaintext = b"Test";
        let blob = crypto.encrypt(plaintext).unwrap();

        // Nonce = 12 bytes, Tag = 16 bytes
        assert_eq!(blob.len(), plaintext.len() + NONCE_SIZE + 16);
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let crypto = LogCrypto::new(&test_key(7));

        let plaintext = b"Deterministic test";
        let blob1 = crypto.encrypt(plaintext).unwrap();
        let blob2 = crypto.encrypt(plaintext).unwrap();

        // Different nonces should produce different blobs
        assert_ne!(blob1, blob2);

        assert_eq!(crypto.decrypt(&blob1).unwrap(), plaintext.as_slice());
        assert_eq!(crypto.decrypt(&blob2).unwrap(), plaintext.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let crypto1 = LogCrypto::new(&test_key(1));
        let crypto2 = LogCrypto::new(&test_key(2));

        let blob = crypto1.encrypt(b"Secret").unwrap();
        let result = crypto2.decrypt(&blob);

        assert!(matches!(result, Err(ChatError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_data_fails() {
        let crypto = LogCrypto::new(&test_key(7));

        let mut blob = crypto.encrypt(b"Original message").unwrap();
        blob[NONCE_SIZE] ^= 0xFF;

        assert!(crypto.decrypt(&blob).is_err());
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let crypto = LogCrypto::new(&test_key(7));

        let mut blob = crypto.encrypt(b"Original message").unwrap();
        blob[0] ^= 0xFF;

        assert!(crypto.decrypt(&blob).is_err());
    }

    #[test]
    fn test_truncated_data_fails() {
        let crypto = LogCrypto::new(&test_key(7));

        let blob = crypto.encrypt(b"Original message").unwrap();
        let result = crypto.decrypt(&blob[..5]);

        match result {
            Err(ChatError::DecryptionFailed(msg)) => assert!(msg.contains("too short")),
            other => panic!("Expected DecryptionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_from_ecdh_secret_deterministic() {
        let secret = [0x42u8; 48];
        let key1 = SharedKey::from_ecdh_secret(&secret);
        let key2 = SharedKey::from_ecdh_secret(&secret);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_from_ecdh_secret_differs_by_input() {
        let key1 = SharedKey::from_ecdh_secret(&[0x41u8; 48]);
        let key2 = SharedKey::from_ecdh_secret(&[0x42u8; 48]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_shared_key_debug_redacted() {
        let key = test_key(0xAB);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("171")); // 0xAB
        assert!(!debug.contains("ab"));
    }
}
