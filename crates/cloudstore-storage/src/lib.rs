//! cloudstore-storage: blob stores for uploaded payloads
//!
//! Every backend implements [`BlobStore`]. Uploads go through a
//! [`RankedBlobStore`], which tries the configured providers in order and
//! returns the first success.

pub mod blob;
pub mod gateway;
pub mod health;
pub mod operator;
pub mod ranked;

pub use blob::{BlobStore, StorageError};
pub use gateway::{FilebaseStore, PinataStore};
pub use health::{check_health, ProviderHealth};
pub use operator::{build_blob_stores, OpendalStore, ProviderCredentials};
pub use ranked::{FetchedBlob, RankedBlobStore};
