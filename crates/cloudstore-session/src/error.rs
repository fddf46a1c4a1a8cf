use cloudstore_core::FileId;
use cloudstore_crypto::EnvelopeError;
use cloudstore_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the {kind} file appears to be corrupted, please select a new file")]
    Corrupted { kind: String },

    #[error("file {0} not found")]
    FileNotFound(FileId),

    #[error("invalid wallet address {0:?}")]
    InvalidAddress(String),

    #[error("{address} may not access file {id}")]
    AccessDenied { id: FileId, address: String },

    #[error("only the owner may modify file {0}")]
    NotOwner(FileId),

    #[error("invalid share: {0}")]
    InvalidShare(String),

    #[error("no wrapped key held for file {0}")]
    MissingKey(FileId),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("registry error: {0}")]
    Registry(String),
}
