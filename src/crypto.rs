//! Secret encryption using AES-256-GCM.
//!
//! Platform secrets (AI provider keys, SMTP and OAuth credentials) are stored
//! encrypted, bound to the name of the field they belong to through additional
//! authenticated data (AAD). Text columns hold the sealed bytes as
//! `enc:v1:<base64>`; values without that prefix are treated as legacy plaintext.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;
const TEXT_PREFIX: &str = "enc:v1:";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes as `version || nonce || ciphertext+tag`.
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes produced by [`encrypt_bytes`].
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Whether a stored text value is in the sealed `enc:v1:` format.
pub fn is_encrypted_text(value: &str) -> bool {
    value.starts_with(TEXT_PREFIX)
}

/// Seal a secret for storage in a text column, bound to `field`.
pub fn encrypt_secret(key: &CryptoKey, field: &str, plaintext: &str) -> Result<String, CryptoError> {
    let sealed = encrypt_bytes(key, field.as_bytes(), plaintext.as_bytes())?;
    Ok(format!(
        "{TEXT_PREFIX}{}",
        general_purpose::STANDARD.encode(sealed)
    ))
}

/// Open a secret stored by [`encrypt_secret`]. Legacy plaintext passes through.
pub fn decrypt_secret(key: &CryptoKey, field: &str, stored: &str) -> Result<String, CryptoError> {
    let Some(encoded) = stored.strip_prefix(TEXT_PREFIX) else {
        return Ok(stored.to_string());
    };

    let sealed = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidFormat)?;
    let bytes = decrypt_bytes(key, field.as_bytes(), &sealed)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_secret_roundtrip() {
        let key = test_key();
        let sealed = encrypt_secret(&key, "openai_api_key", "sk-live-123").unwrap();

        assert!(is_encrypted_text(&sealed));
        assert!(!sealed.contains("sk-live-123"));
        assert_eq!(
            decrypt_secret(&key, "openai_api_key", &sealed).unwrap(),
            "sk-live-123"
        );
    }

    #[test]
    fn test_secret_bound_to_field() {
        let key = test_key();
        let sealed = encrypt_secret(&key, "smtp_password", "hunter2").unwrap();

        assert!(matches!(
            decrypt_secret(&key, "stripe_secret_key", &sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt_secret(&test_key(), "smtp_password", "hunter2").unwrap();
        let other = CryptoKey::new(vec![9u8; 32]).unwrap();

        assert!(decrypt_secret(&other, "smtp_password", &sealed).is_err());
    }

    #[test]
    fn test_legacy_plaintext_passthrough() {
        let key = test_key();
        assert_eq!(
            decrypt_secret(&key, "openai_api_key", "sk-plain").unwrap(),
            "sk-plain"
        );
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        encrypted[13] ^= 0x01;

        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let second = encrypt_bytes(&key, b"aad", b"same").unwrap();

        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[VERSION_ENCRYPTED, 0x02]),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_secret(&key, "f", "enc:v1:not base64!"),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }
}
