//! Password-based encryption for vault payloads.
//!
//! Uses PBKDF2-HMAC-SHA256 to derive a 256-bit key from the master password
//! and AES-256-GCM for the payload. Output is `base64(salt || nonce || ct)`;
//! both the 16-byte salt and the 12-byte nonce are random per call, so
//! encrypting the same plaintext twice yields different ciphertext.
//!
//! Contexts without a master password never reach this module: callers hold
//! a [`crate::models::ConfigPayload::Plain`] value and store plaintext JSON.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::{Error, Result};

/// Salt length in bytes
const SALT_LENGTH: usize = 16;

/// Nonce length in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// Derived key length in bytes (256 bits for AES-256)
const KEY_LENGTH: usize = 32;

/// PBKDF2 iteration count
const PBKDF2_ROUNDS: u32 = 100_000;

/// Plaintext stored in a config's `secretsRef` field. Decrypting it proves
/// a supplied master password is the one the config was encrypted with.
pub const SECRETS_REF_CANARY: &str = "rdc-master-v1";

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Encrypt a plaintext payload with the given master password.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::Other(format!("Failed to create cipher: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| Error::Other(format!("Encryption failed: {}", e)))?;

    let mut combined = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&combined))
}

/// Decrypt a payload produced by [`encrypt`].
///
/// A wrong password fails with [`Error::DecryptFailed`], never with garbage
/// output: AES-GCM authenticates the ciphertext before releasing plaintext.
pub fn decrypt(encoded: &str, password: &str) -> Result<String> {
    let combined = BASE64
        .decode(encoded.trim())
        .map_err(|_| Error::DecryptFailed)?;

    if combined.len() < SALT_LENGTH + NONCE_LENGTH {
        return Err(Error::DecryptFailed);
    }

    let (salt, rest) = combined.split_at(SALT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::Other(format!("Failed to create cipher: {}", e)))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::DecryptFailed)?;

    String::from_utf8(plaintext).map_err(|_| Error::DecryptFailed)
}

/// Encrypt a JSON value for storage as a vault field.
pub fn encrypt_json(value: &serde_json::Value, password: &str) -> Result<String> {
    encrypt(&serde_json::to_string(value)?, password)
}

/// Decrypt a vault field back into a JSON value.
pub fn decrypt_json(encoded: &str, password: &str) -> Result<serde_json::Value> {
    let plaintext = decrypt(encoded, password)?;
    serde_json::from_str(&plaintext)
        .map_err(|e| Error::Corrupt("vault payload".to_string(), e.to_string()))
}

/// Build a `secretsRef` blob for a config being encrypted with `password`.
pub fn make_secrets_ref(password: &str) -> Result<String> {
    encrypt(SECRETS_REF_CANARY, password)
}

/// Verify a password against a config's `secretsRef` blob.
pub fn verify_secrets_ref(secrets_ref: &str, password: &str) -> Result<()> {
    let canary = decrypt(secrets_ref, password)?;
    if canary == SECRETS_REF_CANARY {
        Ok(())
    } else {
        Err(Error::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let encrypted = encrypt("my-secret-payload", "hunter2").unwrap();
        let decrypted = decrypt(&encrypted, "hunter2").unwrap();
        assert_eq!(decrypted, "my-secret-payload");
    }

    #[test]
    fn test_wrong_password_fails_distinguishably() {
        let encrypted = encrypt("secret", "correct-password").unwrap();
        match decrypt(&encrypted, "wrong-password") {
            Err(crate::Error::DecryptFailed) => {}
            other => panic!("expected DecryptFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_different_encryptions_differ() {
        let a = encrypt("same-data", "pw").unwrap();
        let b = encrypt("same-data", "pw").unwrap();

        // Random salt and nonce should produce different ciphertext
        assert_ne!(a, b);

        // But both decrypt to the same value
        assert_eq!(decrypt(&a, "pw").unwrap(), "same-data");
        assert_eq!(decrypt(&b, "pw").unwrap(), "same-data");
    }

    #[test]
    fn test_garbage_input_fails() {
        assert!(matches!(
            decrypt("not base64!!!", "pw"),
            Err(crate::Error::DecryptFailed)
        ));
        // Valid base64 but shorter than salt + nonce
        assert!(matches!(
            decrypt("AAAA", "pw"),
            Err(crate::Error::DecryptFailed)
        ));
    }

    #[test]
    fn test_empty_string() {
        let encrypted = encrypt("", "pw").unwrap();
        assert_eq!(decrypt(&encrypted, "pw").unwrap(), "");
    }

    #[test]
    fn test_unicode_content() {
        let plaintext = "Merhaba, 世界! 🎉";
        let encrypted = encrypt(plaintext, "pw").unwrap();
        assert_eq!(decrypt(&encrypted, "pw").unwrap(), plaintext);
    }

    #[test]
    fn test_json_roundtrip() {
        let value = serde_json::json!({"user": "root", "port": 22});
        let encrypted = encrypt_json(&value, "pw").unwrap();
        assert_eq!(decrypt_json(&encrypted, "pw").unwrap(), value);
    }

    #[test]
    fn test_secrets_ref_verification() {
        let blob = make_secrets_ref("master-pw").unwrap();
        assert!(verify_secrets_ref(&blob, "master-pw").is_ok());
        assert!(matches!(
            verify_secrets_ref(&blob, "other-pw"),
            Err(crate::Error::DecryptFailed)
        ));
    }
}
