//! Envelope operations: encrypt for an owner, decrypt, and reshare

use tracing::debug;

use crate::error::EnvelopeError;
use crate::kdf::{canonical_address, derive_wrapping_key_with, KdfParams, WrappingKey};
use crate::keys::{generate_content_key, unwrap_key, wrap_key, WrappedKey};
use crate::payload::{self, EncryptedPayload};

/// Stateless envelope key manager.
///
/// Holds only the KDF parameters; every call re-derives the wrapping keys it
/// needs and drops the content key before returning.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeKeyManager {
    params: KdfParams,
}

impl EnvelopeKeyManager {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn derive_wrapping_key(&self, address: &str) -> Result<WrappingKey, EnvelopeError> {
        derive_wrapping_key_with(address, &self.params)
    }

    /// Encrypt `plaintext` under a fresh content key and wrap that key for
    /// `address`. Either both artifacts are produced or neither is.
    pub fn encrypt_payload(
        &self,
        plaintext: &[u8],
        address: &str,
    ) -> Result<(EncryptedPayload, WrappedKey), EnvelopeError> {
        let wrapping = self.derive_wrapping_key(address)?;
        let content_key = generate_content_key();

        let sealed = payload::seal(&content_key, plaintext)?;
        let wrapped = wrap_key(&wrapping, &content_key)?;

        debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = sealed.len(),
            wrapping_key = %wrapping.fingerprint(),
            "payload encrypted"
        );
        Ok((sealed, wrapped))
    }

    /// Recover the plaintext of a payload wrapped for `address`.
    pub fn decrypt_payload(
        &self,
        sealed: &EncryptedPayload,
        wrapped: &WrappedKey,
        address: &str,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let wrapping = self.derive_wrapping_key(address)?;
        let content_key = unwrap_key(&wrapping, wrapped)?;
        let plaintext = payload::open(&content_key, sealed)?;

        debug!(
            plaintext_len = plaintext.len(),
            wrapping_key = %wrapping.fingerprint(),
            "payload decrypted"
        );
        Ok(plaintext)
    }

    /// Re-wrap the content key of `wrapped` from `owner` to `recipient`.
    ///
    /// An unwrap failure here means the wrapped key does not belong to
    /// `owner`.
    pub fn reshare_key(
        &self,
        wrapped: &WrappedKey,
        owner: &str,
        recipient: &str,
    ) -> Result<WrappedKey, EnvelopeError> {
        canonical_address(owner)?;
        canonical_address(recipient)?;

        let owner_key = self.derive_wrapping_key(owner)?;
        let content_key = unwrap_key(&owner_key, wrapped)?;

        let recipient_key = self.derive_wrapping_key(recipient)?;
        let reshared = wrap_key(&recipient_key, &content_key)?;

        debug!(
            owner_key = %owner_key.fingerprint(),
            recipient_key = %recipient_key.fingerprint(),
            "content key reshared"
        );
        Ok(reshared)
    }
}

/// [`EnvelopeKeyManager::encrypt_payload`] with the default parameters.
pub fn encrypt_payload(
    plaintext: &[u8],
    address: &str,
) -> Result<(EncryptedPayload, WrappedKey), EnvelopeError> {
    EnvelopeKeyManager::default().encrypt_payload(plaintext, address)
}

/// [`EnvelopeKeyManager::decrypt_payload`] with the default parameters.
pub fn decrypt_payload(
    sealed: &EncryptedPayload,
    wrapped: &WrappedKey,
    address: &str,
) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeKeyManager::default().decrypt_payload(sealed, wrapped, address)
}

/// [`EnvelopeKeyManager::reshare_key`] with the default parameters.
pub fn reshare_key(
    wrapped: &WrappedKey,
    owner: &str,
    recipient: &str,
) -> Result<WrappedKey, EnvelopeError> {
    EnvelopeKeyManager::default().reshare_key(wrapped, owner, recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_manager() -> EnvelopeKeyManager {
        EnvelopeKeyManager::new(KdfParams {
            salt: "test-salt".into(),
            iterations: 1,
        })
    }

    #[test]
    fn test_roundtrip_with_custom_params() {
        let mgr = fast_manager();
        let (sealed, wrapped) = mgr.encrypt_payload(b"data", "0xaaa").unwrap();
        assert_eq!(mgr.decrypt_payload(&sealed, &wrapped, "0xAAA").unwrap(), b"data");
    }

    #[test]
    fn test_params_are_part_of_the_contract() {
        let (sealed, wrapped) = fast_manager().encrypt_payload(b"data", "0xaaa").unwrap();

        let err = EnvelopeKeyManager::default()
            .decrypt_payload(&sealed, &wrapped, "0xaaa")
            .unwrap_err();
        assert_eq!(err, EnvelopeError::UnwrapFailed);
    }

    #[test]
    fn test_reshare_missing_addresses() {
        let mgr = fast_manager();
        let (_, wrapped) = mgr.encrypt_payload(b"data", "0xaaa").unwrap();

        assert_eq!(
            mgr.reshare_key(&wrapped, "", "0xbbb").unwrap_err(),
            EnvelopeError::MissingAddress
        );
        assert_eq!(
            mgr.reshare_key(&wrapped, "0xaaa", " ").unwrap_err(),
            EnvelopeError::MissingAddress
        );
    }

    #[test]
    fn test_reshare_owner_mismatch() {
        let mgr = fast_manager();
        let (_, wrapped) = mgr.encrypt_payload(b"data", "0xaaa").unwrap();

        assert_eq!(
            mgr.reshare_key(&wrapped, "0xccc", "0xbbb").unwrap_err(),
            EnvelopeError::UnwrapFailed
        );
    }

    #[test]
    fn test_encrypt_missing_address() {
        assert_eq!(
            fast_manager().encrypt_payload(b"data", "").unwrap_err(),
            EnvelopeError::MissingAddress
        );
    }
}
