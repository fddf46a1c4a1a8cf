//! Payload encryption under a content key (AES-256-GCM)
//!
//! Encrypted payload format (binary):
//! ```text
//! [1 byte: version][12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! AAD = "cloudstore-payload" || version
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::EnvelopeError;
use crate::keys::ContentKey;
use crate::{FORMAT_VERSION, NONCE_SIZE, TAG_SIZE};

const PAYLOAD_AAD: &[u8] = b"cloudstore-payload";

const HEADER_SIZE: usize = 1 + NONCE_SIZE;

/// File bytes encrypted under a content key, as stored in the blob store.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    bytes: Vec<u8>,
}

impl EncryptedPayload {
    /// Parse a payload fetched from storage.
    ///
    /// Zero-length input is reported as [`EnvelopeError::EmptyCiphertext`];
    /// a truncated or foreign blob as [`EnvelopeError::PayloadDecryptFailed`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EnvelopeError> {
        if bytes.is_empty() {
            return Err(EnvelopeError::EmptyCiphertext);
        }
        if bytes.len() < HEADER_SIZE + TAG_SIZE || bytes[0] != FORMAT_VERSION {
            return Err(EnvelopeError::PayloadDecryptFailed);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn payload_aad() -> Vec<u8> {
    let mut aad = Vec::with_capacity(PAYLOAD_AAD.len() + 1);
    aad.extend_from_slice(PAYLOAD_AAD);
    aad.push(FORMAT_VERSION);
    aad
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &ContentKey, plaintext: &[u8]) -> Result<EncryptedPayload, EnvelopeError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = payload_aad();
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| EnvelopeError::EmptyCiphertext)?;

    if ciphertext.is_empty() {
        return Err(EnvelopeError::EmptyCiphertext);
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&nonce_bytes);
    bytes.extend_from_slice(&ciphertext);
    Ok(EncryptedPayload { bytes })
}

/// Decrypt a payload. Any authentication failure means the ciphertext was
/// altered (or sealed under another key) and is never returned as plaintext.
pub fn open(key: &ContentKey, payload: &EncryptedPayload) -> Result<Vec<u8>, EnvelopeError> {
    let (nonce_bytes, ciphertext) = payload.bytes[1..].split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let aad = payload_aad();
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| EnvelopeError::PayloadDecryptFailed)
}
