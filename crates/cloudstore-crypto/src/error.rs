use thiserror::Error;

/// Failures of the envelope operations. Each kind is distinct so callers can
/// tell a wrong address apart from a damaged payload; none are retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("no wallet address provided for key derivation")]
    MissingAddress,

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("failed to wrap content key: {0}")]
    WrapFailed(String),

    #[error("failed to unwrap content key: wrong wallet address or corrupted wrapped key")]
    UnwrapFailed,

    #[error("failed to decrypt payload: ciphertext is corrupted")]
    PayloadDecryptFailed,

    #[error("encryption produced an empty ciphertext")]
    EmptyCiphertext,
}
