pub mod config;
pub mod error;
pub mod types;

pub use error::{CloudStoreError, CloudStoreResult};
pub use types::{BlobHandle, FileId, FileRecord, WalletAddress};
