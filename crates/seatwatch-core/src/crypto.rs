//! Encryption of upstream credentials and sessions at rest
//!
//! AES-256-GCM with a random 12-byte nonce prepended to the ciphertext; the
//! result is base64 so it fits a TEXT column.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Opaque encrypt/decrypt capability for secrets stored in the database.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM cipher keyed by the SHA-256 of a passphrase.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CipherError> {
        let key = Sha256::digest(passphrase.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CipherError::Encrypt(format!("key init failed: {e}")))?;
        Ok(Self { cipher })
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| CipherError::Decrypt(format!("base64: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::Decrypt("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::Decrypt(format!("utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = AesGcmCipher::from_passphrase("test-key").unwrap();
        let sealed = cipher.encrypt("member@example.com").unwrap();
        assert_ne!(sealed, "member@example.com");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "member@example.com");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = AesGcmCipher::from_passphrase("test-key").unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = AesGcmCipher::from_passphrase("right")
            .unwrap()
            .encrypt("secret")
            .unwrap();
        let other = AesGcmCipher::from_passphrase("wrong").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_garbage_fails() {
        let cipher = AesGcmCipher::from_passphrase("k").unwrap();
        assert!(cipher.decrypt("not base64!").is_err());
        assert!(cipher.decrypt("c2hvcnQ=").is_err());
    }
}
