//! OpenDAL-backed blob store and the provider factory

use async_trait::async_trait;
use cloudstore_core::config::{expand_tilde, StorageConfig};
use cloudstore_core::BlobHandle;
use opendal::{ErrorKind, Operator};
use reqwest::Client;
use secrecy::SecretString;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::blob::{BlobStore, StorageError};
use crate::gateway::{FilebaseStore, PinataStore};
use crate::ranked::RankedBlobStore;

/// Content-addressed store over any OpenDAL operator.
///
/// Blobs live at `{prefix}/blobs/{blake3 hex}`; the hash is re-checked on
/// every fetch.
pub struct OpendalStore {
    name: String,
    op: Operator,
    prefix: String,
}

impl OpendalStore {
    pub const NAME: &'static str = "local";

    pub fn new(op: Operator, prefix: &str) -> Self {
        Self::named(Self::NAME, op, prefix)
    }

    pub fn named(name: &str, op: Operator, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn blob_path(&self, hash: &str) -> String {
        if self.prefix.is_empty() {
            format!("blobs/{hash}")
        } else {
            format!("{}/blobs/{hash}", self.prefix)
        }
    }

    fn backend_error(&self, source: opendal::Error) -> StorageError {
        StorageError::Backend {
            provider: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl BlobStore for OpendalStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<BlobHandle, StorageError> {
        let hash = blake3::hash(bytes).to_hex().to_string();
        let path = self.blob_path(&hash);

        // Content-addressed: an existing object already holds these bytes
        if self.op.exists(&path).await.map_err(|e| self.backend_error(e))? {
            debug!(%path, file_name, "blob already stored");
        } else {
            self.op
                .write(&path, bytes.to_vec())
                .await
                .map_err(|e| self.backend_error(e))?;
            info!(%path, file_name, size = bytes.len(), "blob stored");
        }

        Ok(BlobHandle {
            url: format!("{}://{}", self.name, path),
            hash,
            provider: self.name.clone(),
        })
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(hash);
        let buf = match self.op.read(&path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(hash.into()))
            }
            Err(e) => return Err(self.backend_error(e)),
        };

        let bytes = buf.to_vec();
        if blake3::hash(&bytes).to_hex().as_str() != hash {
            return Err(StorageError::IntegrityMismatch { hash: hash.into() });
        }
        Ok(bytes)
    }

    async fn health(&self) -> Result<(), StorageError> {
        self.op
            .list("/")
            .await
            .map(|_| ())
            .map_err(|e| self.backend_error(e))
    }
}

/// Build an OpenDAL operator over a local directory.
pub fn build_fs_operator(root: &Path) -> Result<Operator, StorageError> {
    let root = expand_tilde(root);
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());

    let op = Operator::new(builder)
        .map_err(|source| StorageError::Backend {
            provider: OpendalStore::NAME.into(),
            source,
        })?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an in-memory operator (tests and throwaway sessions).
pub fn build_memory_operator() -> Result<Operator, StorageError> {
    Operator::new(opendal::services::Memory::default())
        .map(|b| b.finish())
        .map_err(|source| StorageError::Backend {
            provider: "memory".into(),
            source,
        })
}

/// API credentials for the pinning gateways.
#[derive(Default)]
pub struct ProviderCredentials {
    pub pinata_api_key: Option<SecretString>,
    pub pinata_api_secret: Option<SecretString>,
    pub filebase_api_key: Option<SecretString>,
}

impl ProviderCredentials {
    /// Read `PINATA_API_KEY`, `PINATA_API_SECRET`, and `FILEBASE_API_KEY`.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        };
        Self {
            pinata_api_key: var("PINATA_API_KEY"),
            pinata_api_secret: var("PINATA_API_SECRET"),
            filebase_api_key: var("FILEBASE_API_KEY"),
        }
    }
}

fn check_endpoint_tls(name: &str, endpoint: &str, enforce_tls: bool) -> Result<(), StorageError> {
    if endpoint.starts_with("http://") {
        if enforce_tls {
            return Err(StorageError::Config(format!(
                "{name} endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development."
            )));
        }
        warn!(
            provider = name,
            %endpoint,
            "endpoint uses plaintext HTTP; API credentials are transmitted unencrypted"
        );
    }
    Ok(())
}

/// Build the ranked provider list from config.
///
/// Gateways without credentials are skipped with a warning; an unknown
/// provider name is a config error, as is ending up with no provider at all.
pub fn build_blob_stores(
    cfg: &StorageConfig,
    creds: ProviderCredentials,
) -> Result<RankedBlobStore, StorageError> {
    let client = Client::builder()
        .user_agent(concat!("cloudstore/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| StorageError::Http {
            provider: "client".into(),
            source,
        })?;

    let ProviderCredentials {
        pinata_api_key,
        pinata_api_secret,
        filebase_api_key,
    } = creds;
    let mut pinata_creds = pinata_api_key.zip(pinata_api_secret);
    let mut filebase_key = filebase_api_key;

    let mut stores: Vec<Box<dyn BlobStore>> = Vec::new();
    for provider in &cfg.providers {
        match provider.as_str() {
            PinataStore::NAME => {
                check_endpoint_tls(PinataStore::NAME, &cfg.pinata_endpoint, cfg.enforce_tls)?;
                match pinata_creds.take() {
                    Some((key, secret)) => stores.push(Box::new(PinataStore::new(
                        client.clone(),
                        &cfg.pinata_endpoint,
                        &cfg.pinata_gateway,
                        key,
                        secret,
                    ))),
                    None => warn!("pinata: PINATA_API_KEY / PINATA_API_SECRET not set, skipping"),
                }
            }
            FilebaseStore::NAME => {
                check_endpoint_tls(FilebaseStore::NAME, &cfg.filebase_endpoint, cfg.enforce_tls)?;
                match filebase_key.take() {
                    Some(key) => stores.push(Box::new(FilebaseStore::new(
                        client.clone(),
                        &cfg.filebase_endpoint,
                        &cfg.filebase_gateway,
                        key,
                    ))),
                    None => warn!("filebase: FILEBASE_API_KEY not set, skipping"),
                }
            }
            OpendalStore::NAME => {
                let op = build_fs_operator(&cfg.local_root)?;
                stores.push(Box::new(OpendalStore::new(op, &cfg.local_prefix)));
            }
            other => {
                return Err(StorageError::Config(format!(
                    "unknown storage provider {other:?} (expected pinata, filebase, or local)"
                )))
            }
        }
    }

    if stores.is_empty() {
        return Err(StorageError::NoProviders);
    }
    Ok(RankedBlobStore::new(stores))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> OpendalStore {
        OpendalStore::new(build_memory_operator().unwrap(), "test")
    }

    #[tokio::test]
    async fn test_upload_fetch_roundtrip() {
        let store = memory_store();
        let handle = store.upload(b"hello blobs", "a.txt").await.unwrap();

        assert_eq!(handle.provider, "local");
        assert_eq!(handle.hash, blake3::hash(b"hello blobs").to_hex().to_string());
        assert_eq!(handle.url, format!("local://test/blobs/{}", handle.hash));
        assert_eq!(store.fetch(&handle.hash).await.unwrap(), b"hello blobs");
    }

    #[tokio::test]
    async fn test_upload_is_idempotent() {
        let store = memory_store();
        let a = store.upload(b"same", "a.txt").await.unwrap();
        let b = store.upload(b"same", "b.txt").await.unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let store = memory_store();
        let err = store.fetch("deadbeef").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_detects_tampering() {
        let store = memory_store();
        let handle = store.upload(b"original", "a.txt").await.unwrap();
        store
            .operator()
            .write(&store.blob_path(&handle.hash), b"tampered".to_vec())
            .await
            .unwrap();

        let err = store.fetch(&handle.hash).await.unwrap_err();
        assert!(matches!(err, StorageError::IntegrityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fs_operator_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = OpendalStore::new(build_fs_operator(tmp.path()).unwrap(), "");
        let handle = store.upload(b"on disk", "d.bin").await.unwrap();

        assert!(tmp.path().join("blobs").join(&handle.hash).exists());
        assert_eq!(store.fetch(&handle.hash).await.unwrap(), b"on disk");
    }

    #[test]
    fn test_build_skips_gateways_without_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            providers: vec!["pinata".into(), "filebase".into(), "local".into()],
            local_root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let ranked = build_blob_stores(&cfg, ProviderCredentials::default()).unwrap();
        assert_eq!(ranked.provider_names(), vec!["local".to_string()]);
    }

    #[test]
    fn test_build_keeps_configured_order() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            providers: vec!["local".into(), "filebase".into(), "pinata".into()],
            local_root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let creds = ProviderCredentials {
            pinata_api_key: Some(SecretString::from("k".to_string())),
            pinata_api_secret: Some(SecretString::from("s".to_string())),
            filebase_api_key: Some(SecretString::from("f".to_string())),
        };
        let ranked = build_blob_stores(&cfg, creds).unwrap();
        assert_eq!(
            ranked.provider_names(),
            vec!["local".to_string(), "filebase".to_string(), "pinata".to_string()]
        );
    }

    #[test]
    fn test_build_no_providers() {
        let cfg = StorageConfig::default();
        let err = build_blob_stores(&cfg, ProviderCredentials::default()).unwrap_err();
        assert!(matches!(err, StorageError::NoProviders));
    }

    #[test]
    fn test_build_unknown_provider() {
        let cfg = StorageConfig {
            providers: vec!["dropbox".into()],
            ..Default::default()
        };
        let err = build_blob_stores(&cfg, ProviderCredentials::default()).unwrap_err();
        assert!(err.to_string().contains("dropbox"));
    }

    #[test]
    fn test_build_http_enforce_tls() {
        let cfg = StorageConfig {
            providers: vec!["pinata".into()],
            pinata_endpoint: "http://insecure:8080".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let err = build_blob_stores(&cfg, ProviderCredentials::default()).unwrap_err();
        assert!(
            err.to_string().contains("enforce_tls"),
            "error message should mention enforce_tls"
        );
    }
}
