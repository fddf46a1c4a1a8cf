//! Content key generation and wrapping under a wallet-derived key
//!
//! Wrapped key format (binary, then standard base64 when persisted):
//! ```text
//! [1 byte: version][12 bytes: random nonce][32 bytes: ciphertext][16 bytes: GCM tag]
//! AAD = "cloudstore-wrap" || version
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::EnvelopeError;
use crate::kdf::WrappingKey;
use crate::{FORMAT_VERSION, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

const WRAP_AAD: &[u8] = b"cloudstore-wrap";

/// Serialized length of a wrapped key
pub const WRAPPED_KEY_SIZE: usize = 1 + NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// A per-file 256-bit content key. Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A content key encrypted under a wrapping key; the only persisted form of
/// a content key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WrappedKey {
    bytes: Vec<u8>,
}

impl WrappedKey {
    /// Parse the binary form. Anything that is not a v1 wrapped key of the
    /// exact size is rejected as an unwrap failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() != WRAPPED_KEY_SIZE || bytes[0] != FORMAT_VERSION {
            return Err(EnvelopeError::UnwrapFailed);
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, EnvelopeError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| EnvelopeError::UnwrapFailed)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WrappedKey").field(&self.to_base64()).finish()
    }
}

impl TryFrom<String> for WrappedKey {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base64(&value)
    }
}

impl From<WrappedKey> for String {
    fn from(value: WrappedKey) -> Self {
        value.to_base64()
    }
}

/// Generate a random 256-bit content key.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ContentKey::from_bytes(bytes)
}

fn wrap_aad() -> Vec<u8> {
    let mut aad = Vec::with_capacity(WRAP_AAD.len() + 1);
    aad.extend_from_slice(WRAP_AAD);
    aad.push(FORMAT_VERSION);
    aad
}

/// Wrap (encrypt) a content key under a wrapping key with a random nonce.
pub fn wrap_key(wrapping: &WrappingKey, content: &ContentKey) -> Result<WrappedKey, EnvelopeError> {
    let cipher = Aes256Gcm::new(wrapping.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = wrap_aad();
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: content.as_bytes().as_ref(),
                aad: &aad,
            },
        )
        .map_err(|e| EnvelopeError::WrapFailed(e.to_string()))?;

    if ciphertext.len() != KEY_SIZE + TAG_SIZE {
        return Err(EnvelopeError::WrapFailed(format!(
            "unexpected wrapped length {}",
            ciphertext.len()
        )));
    }

    let mut bytes = Vec::with_capacity(WRAPPED_KEY_SIZE);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&nonce_bytes);
    bytes.extend_from_slice(&ciphertext);
    Ok(WrappedKey { bytes })
}

/// Unwrap (decrypt) a content key. A wrong wrapping key and a damaged wrapped
/// key both fail authentication and surface as [`EnvelopeError::UnwrapFailed`].
pub fn unwrap_key(wrapping: &WrappingKey, wrapped: &WrappedKey) -> Result<ContentKey, EnvelopeError> {
    let (nonce_bytes, ciphertext) = wrapped.bytes[1..].split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(wrapping.as_bytes().into());

    let aad = wrap_aad();
    let mut plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| EnvelopeError::UnwrapFailed)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(EnvelopeError::UnwrapFailed);
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(ContentKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_wrapping_key(fill: u8) -> WrappingKey {
        WrappingKey::from_bytes([fill; KEY_SIZE])
    }

    #[test]
    fn test_content_key_generation() {
        let k1 = generate_content_key();
        let k2 = generate_content_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_key_wrap_unwrap_roundtrip() {
        let wrapping = test_wrapping_key(42);
        let content = generate_content_key();

        let wrapped = wrap_key(&wrapping, &content).unwrap();
        let unwrapped = unwrap_key(&wrapping, &wrapped).unwrap();

        assert_eq!(content.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_key_unwrap_wrong_wrapping_key() {
        let content = generate_content_key();
        let wrapped = wrap_key(&test_wrapping_key(1), &content).unwrap();

        assert_eq!(
            unwrap_key(&test_wrapping_key(2), &wrapped).unwrap_err(),
            EnvelopeError::UnwrapFailed
        );
    }

    #[test]
    fn test_wrapped_key_size_and_version() {
        let wrapped = wrap_key(&test_wrapping_key(7), &generate_content_key()).unwrap();

        // version (1) + nonce (12) + key (32) + tag (16) = 61
        assert_eq!(wrapped.as_bytes().len(), 61);
        assert_eq!(wrapped.as_bytes()[0], FORMAT_VERSION);
    }

    #[test]
    fn test_wrapping_same_key_twice_differs() {
        let wrapping = test_wrapping_key(9);
        let content = generate_content_key();
        let a = wrap_key(&wrapping, &content).unwrap();
        let b = wrap_key(&wrapping, &content).unwrap();
        assert_ne!(a, b, "fresh nonce per wrap");
    }

    #[test]
    fn test_tampered_wrapped_key() {
        let wrapping = test_wrapping_key(3);
        let wrapped = wrap_key(&wrapping, &generate_content_key()).unwrap();

        let mut bytes = wrapped.as_bytes().to_vec();
        bytes[20] ^= 0x01;
        let tampered = WrappedKey::from_bytes(&bytes).unwrap();

        assert_eq!(
            unwrap_key(&wrapping, &tampered).unwrap_err(),
            EnvelopeError::UnwrapFailed
        );
    }

    #[test]
    fn test_from_bytes_rejects_malformed() {
        assert!(WrappedKey::from_bytes(&[]).is_err());
        assert!(WrappedKey::from_bytes(&[FORMAT_VERSION; 10]).is_err());

        let mut wrong_version = vec![0u8; WRAPPED_KEY_SIZE];
        wrong_version[0] = 2;
        assert_eq!(
            WrappedKey::from_bytes(&wrong_version).unwrap_err(),
            EnvelopeError::UnwrapFailed
        );
    }

    #[test]
    fn test_base64_roundtrip_and_serde() {
        let wrapped = wrap_key(&test_wrapping_key(5), &generate_content_key()).unwrap();

        let text = wrapped.to_base64();
        assert_eq!(WrappedKey::from_base64(&text).unwrap(), wrapped);

        let json = serde_json::to_string(&wrapped).unwrap();
        assert_eq!(json, format!("\"{text}\""));
        let parsed: WrappedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wrapped);

        assert!(WrappedKey::from_base64("not base64 at all!").is_err());
    }
}
