//! Key derivation: wallet address → wrapping key (PBKDF2-HMAC-SHA256)

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::EnvelopeError;
use crate::KEY_SIZE;

/// Salt shared by every account. Part of the wrapped-key format v1 contract.
pub const DEFAULT_SALT: &str = "CloudStore_Salt_2025";

/// PBKDF2 rounds for format v1.
pub const DEFAULT_ITERATIONS: u32 = 1000;

/// A 256-bit key derived from a wallet address. Never persisted.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct WrappingKey {
    bytes: [u8; KEY_SIZE],
}

impl WrappingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Short SHA-256 check value, safe to display or log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }
}

impl PartialEq for WrappingKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for WrappingKey {}

impl Drop for WrappingKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters for wrapping key derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Salt applied to every address (default: `CloudStore_Salt_2025`)
    pub salt: String,
    /// PBKDF2 rounds (default: 1000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            salt: DEFAULT_SALT.into(),
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Canonical form of an address used as KDF input: lowercased, nothing else.
///
/// Lowercasing makes checksummed (mixed-case) and plain renderings of the same
/// account derive the same key. Surrounding whitespace is kept, so `"0xabc "`
/// and `"0xabc"` derive different keys; callers trim when parsing addresses.
/// Blank input is rejected.
pub fn canonical_address(address: &str) -> Result<String, EnvelopeError> {
    if address.trim().is_empty() {
        return Err(EnvelopeError::MissingAddress);
    }
    Ok(address.to_lowercase())
}

/// Derive the wrapping key for `address` with the default parameters.
pub fn derive_wrapping_key(address: &str) -> Result<WrappingKey, EnvelopeError> {
    derive_wrapping_key_with(address, &KdfParams::default())
}

/// Derive the wrapping key for `address` with explicit parameters.
pub fn derive_wrapping_key_with(
    address: &str,
    params: &KdfParams,
) -> Result<WrappingKey, EnvelopeError> {
    let canonical = canonical_address(address)?;

    if params.iterations == 0 {
        return Err(EnvelopeError::KeyDerivationFailed(
            "iteration count must be non-zero".into(),
        ));
    }
    if params.salt.is_empty() {
        return Err(EnvelopeError::KeyDerivationFailed("salt is empty".into()));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        canonical.as_bytes(),
        params.salt.as_bytes(),
        params.iterations,
        &mut key,
    );

    Ok(WrappingKey::from_bytes(key))
}
