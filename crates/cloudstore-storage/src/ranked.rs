//! Ranked fallback across several blob stores

use async_trait::async_trait;
use cloudstore_core::BlobHandle;
use tracing::warn;

use crate::blob::{BlobStore, StorageError};

/// Bytes returned by a ranked fetch and the provider that served them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub provider: String,
}

/// Providers tried in order; the first success wins.
pub struct RankedBlobStore {
    stores: Vec<Box<dyn BlobStore>>,
}

impl std::fmt::Debug for RankedBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankedBlobStore")
            .field("stores", &self.provider_names())
            .finish()
    }
}

impl RankedBlobStore {
    pub fn new(stores: Vec<Box<dyn BlobStore>>) -> Self {
        Self { stores }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn stores(&self) -> impl Iterator<Item = &dyn BlobStore> {
        self.stores.iter().map(|s| s.as_ref())
    }

    /// Fetch `hash`, asking `provider` first when it is one of ours.
    ///
    /// Hashes are provider-specific (CIDs vs BLAKE3), so the provider that
    /// accepted the upload is the one most likely to have it. The result
    /// names the provider that actually answered.
    pub async fn fetch_preferring(
        &self,
        provider: Option<&str>,
        hash: &str,
    ) -> Result<FetchedBlob, StorageError> {
        let mut order: Vec<&dyn BlobStore> = self.stores.iter().map(|s| s.as_ref()).collect();
        if let Some(preferred) = provider {
            if let Some(pos) = order.iter().position(|s| s.name() == preferred) {
                let store = order.remove(pos);
                order.insert(0, store);
            }
        }
        fetch_in_order(&order, hash).await
    }
}

async fn fetch_in_order(
    order: &[&dyn BlobStore],
    hash: &str,
) -> Result<FetchedBlob, StorageError> {
    if order.is_empty() {
        return Err(StorageError::NoProviders);
    }

    let mut failed = Vec::new();
    let mut all_missing = true;
    for store in order {
        match store.fetch(hash).await {
            Ok(bytes) => {
                return Ok(FetchedBlob {
                    bytes,
                    provider: store.name().to_string(),
                })
            }
            Err(e) => {
                if !matches!(e, StorageError::NotFound(_)) {
                    all_missing = false;
                }
                warn!(provider = store.name(), error = %e, "fetch failed, trying next provider");
                failed.push(store.name().to_string());
            }
        }
    }

    if all_missing {
        Err(StorageError::NotFound(hash.into()))
    } else {
        Err(StorageError::AllProvidersFailed(failed))
    }
}

#[async_trait]
impl BlobStore for RankedBlobStore {
    fn name(&self) -> &str {
        "ranked"
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<BlobHandle, StorageError> {
        if self.stores.is_empty() {
            return Err(StorageError::NoProviders);
        }

        let mut failed = Vec::new();
        for store in &self.stores {
            match store.upload(bytes, file_name).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(provider = store.name(), error = %e, "upload failed, trying next provider");
                    failed.push(store.name().to_string());
                }
            }
        }
        Err(StorageError::AllProvidersFailed(failed))
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.fetch_preferring(None, hash).await?.bytes)
    }

    /// Healthy while at least one provider is.
    async fn health(&self) -> Result<(), StorageError> {
        if self.stores.is_empty() {
            return Err(StorageError::NoProviders);
        }
        let mut failed = Vec::new();
        for store in &self.stores {
            match store.health().await {
                Ok(()) => return Ok(()),
                Err(_) => failed.push(store.name().to_string()),
            }
        }
        Err(StorageError::AllProvidersFailed(failed))
    }
}
