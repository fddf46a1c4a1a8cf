//! Upload, retrieve, share, and delete workflows for one active address

use cloudstore_core::{FileId, FileRecord, WalletAddress};
use cloudstore_crypto::{EncryptedPayload, EnvelopeError, EnvelopeKeyManager, WrappedKey};
use cloudstore_storage::{BlobStore, RankedBlobStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::input::{read_all, FileInput};
use crate::keystore::{KeyDelivery, KeyStore};
use crate::registry::{FileRegistry, NewFile};
use crate::sniff::check_corruption;
use crate::usage::UsageTracker;

/// Services shared by every session in the process
#[derive(Clone)]
pub struct SessionContext {
    pub blobs: Arc<RankedBlobStore>,
    pub registry: Arc<dyn FileRegistry>,
    pub delivery: Arc<dyn KeyDelivery>,
    pub envelope: EnvelopeKeyManager,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: FileRecord,
    /// Gateway URL of the stored blob (ciphertext when encrypted)
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RetrievedFile {
    pub record: FileRecord,
    /// Plaintext bytes
    pub bytes: Vec<u8>,
}

/// A connected account.
///
/// The key store belongs to `address` and lives exactly as long as the
/// session; switching accounts means opening a new session.
pub struct Session {
    ctx: SessionContext,
    address: WalletAddress,
    keys: Box<dyn KeyStore>,
    usage: UsageTracker,
}

fn parse_address(raw: &str) -> Result<WalletAddress, SessionError> {
    if raw.trim().is_empty() {
        return Err(SessionError::Envelope(EnvelopeError::MissingAddress));
    }
    WalletAddress::parse(raw).map_err(|_| SessionError::InvalidAddress(raw.to_string()))
}

impl Session {
    pub fn open(
        ctx: SessionContext,
        address: &str,
        keys: Box<dyn KeyStore>,
        usage: UsageTracker,
    ) -> Result<Self, SessionError> {
        let address = parse_address(address)?;
        debug!(address = %address.short(), "session opened");
        Ok(Self {
            ctx,
            address,
            keys,
            usage,
        })
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Read `path` and upload it, envelope-encrypted when `encrypt` is set.
    pub async fn upload(&mut self, path: &Path, encrypt: bool) -> Result<UploadOutcome, SessionError> {
        let input = read_all(path).await?;
        self.upload_input(input, encrypt).await
    }

    /// Upload an in-memory file.
    ///
    /// Nothing is recorded unless the blob is stored; if the wrapped key
    /// cannot be kept, the registry record is withdrawn again.
    pub async fn upload_input(
        &mut self,
        input: FileInput,
        encrypt: bool,
    ) -> Result<UploadOutcome, SessionError> {
        check_corruption(&input.mime_type, &input.bytes)?;
        let size = input.size();

        let (blob, wrapped) = if encrypt {
            let (payload, wrapped) = self
                .ctx
                .envelope
                .encrypt_payload(&input.bytes, self.address.as_str())?;
            (payload.into_bytes(), Some(wrapped))
        } else {
            (input.bytes, None)
        };

        let handle = self.ctx.blobs.upload(&blob, &input.name).await?;
        self.usage.track(&handle.provider, "upload");

        let record = self
            .ctx
            .registry
            .upload(NewFile {
                hash: handle.hash,
                provider: handle.provider,
                name: input.name,
                mime_type: input.mime_type,
                size,
                owner: self.address.clone(),
                encrypted: wrapped.is_some(),
            })
            .await?;

        if let Some(wrapped) = wrapped {
            if let Err(e) = self.keys.put(record.id, wrapped) {
                if let Err(rollback) = self.ctx.registry.delete(record.id, &self.address).await {
                    warn!(id = record.id, "failed to withdraw record after key store error: {rollback}");
                }
                return Err(e);
            }
        }

        info!(
            id = record.id,
            name = %record.name,
            provider = %record.provider,
            encrypted = record.encrypted,
            "upload complete"
        );
        Ok(UploadOutcome {
            record,
            url: handle.url,
        })
    }

    /// Fetch a file the session's address owns or was granted.
    pub async fn retrieve(&mut self, id: FileId) -> Result<RetrievedFile, SessionError> {
        let record = self.ctx.registry.get(id).await?;
        if !record.is_accessible_by(&self.address) {
            return Err(SessionError::AccessDenied {
                id,
                address: self.address.to_string(),
            });
        }

        let fetched = self
            .ctx
            .blobs
            .fetch_preferring(Some(&record.provider), &record.hash)
            .await?;
        self.usage.track(&fetched.provider, "fetch");
        let blob = fetched.bytes;

        let bytes = if record.encrypted {
            let wrapped = self.wrapped_key(id)?;
            let payload = EncryptedPayload::from_bytes(blob)?;
            self.ctx
                .envelope
                .decrypt_payload(&payload, &wrapped, self.address.as_str())?
        } else {
            blob
        };

        debug!(id, size = bytes.len(), "file retrieved");
        Ok(RetrievedFile { record, bytes })
    }

    /// Grant `recipient` access to a file this session owns.
    ///
    /// For encrypted files the content key is rewrapped for the recipient
    /// and delivered to their key store before the grant is recorded.
    pub async fn share(&mut self, id: FileId, recipient: &str) -> Result<(), SessionError> {
        let recipient = parse_address(recipient)?;
        let record = self.ctx.registry.get(id).await?;
        if record.owner != self.address {
            return Err(SessionError::NotOwner(id));
        }
        if recipient == self.address {
            return Err(SessionError::InvalidShare(
                "cannot share a file with its owner".into(),
            ));
        }

        if record.encrypted {
            let wrapped = self.wrapped_key(id)?;
            let reshared =
                self.ctx
                    .envelope
                    .reshare_key(&wrapped, self.address.as_str(), recipient.as_str())?;
            self.ctx.delivery.deliver(&recipient, id, reshared)?;
        }

        self.ctx.registry.share(id, &self.address, &recipient).await?;
        info!(id, recipient = %recipient.short(), "share complete");
        Ok(())
    }

    /// Delete a file record and drop its wrapped key.
    ///
    /// Blobs on pinning gateways are content-addressed and stay pinned.
    pub async fn delete(&mut self, id: FileId) -> Result<FileRecord, SessionError> {
        let record = self.ctx.registry.delete(id, &self.address).await?;
        self.keys.remove(id)?;
        Ok(record)
    }

    pub async fn my_files(&self) -> Result<Vec<FileRecord>, SessionError> {
        self.ctx.registry.list_by_owner(&self.address).await
    }

    pub async fn shared_with_me(&self) -> Result<Vec<FileRecord>, SessionError> {
        self.ctx.registry.list_shared_with(&self.address).await
    }

    fn wrapped_key(&self, id: FileId) -> Result<WrappedKey, SessionError> {
        self.keys.get(id).ok_or(SessionError::MissingKey(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{JsonKeyDirectory, MemoryKeyStore};
    use crate::registry::LocalRegistry;
    use cloudstore_crypto::KdfParams;
    use cloudstore_storage::operator::{build_memory_operator, OpendalStore};

    const ALICE: &str = "0xA11CE00000000000000000000000000000000001";

    fn context(keys_dir: &Path) -> SessionContext {
        let store = OpendalStore::new(build_memory_operator().unwrap(), "test");
        SessionContext {
            blobs: Arc::new(RankedBlobStore::new(vec![Box::new(store)])),
            registry: Arc::new(LocalRegistry::in_memory()),
            delivery: Arc::new(JsonKeyDirectory::new(keys_dir)),
            envelope: EnvelopeKeyManager::new(KdfParams {
                iterations: 2,
                ..Default::default()
            }),
        }
    }

    fn open(ctx: &SessionContext, address: &str) -> Session {
        Session::open(
            ctx.clone(),
            address,
            Box::new(MemoryKeyStore::new()),
            UsageTracker::in_memory(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_requires_address() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let err = Session::open(
            ctx,
            "  ",
            Box::new(MemoryKeyStore::new()),
            UsageTracker::in_memory(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SessionError::Envelope(EnvelopeError::MissingAddress)
        ));
    }

    #[tokio::test]
    async fn test_plain_upload_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("hello.txt", b"hello world".to_vec());
        let outcome = alice.upload_input(input, false).await.unwrap();
        assert!(!outcome.record.encrypted);
        assert_eq!(outcome.record.size, 11);
        assert_eq!(alice.usage().count("local", "upload"), 1);

        let got = alice.retrieve(outcome.record.id).await.unwrap();
        assert_eq!(got.bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_encrypted_blob_is_ciphertext() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("hello.txt", b"hello world".to_vec());
        let outcome = alice.upload_input(input, true).await.unwrap();
        assert!(outcome.record.encrypted);

        let stored = ctx.blobs.fetch(&outcome.record.hash).await.unwrap();
        assert_ne!(stored, b"hello world");
        assert!(stored.len() > 11);

        let got = alice.retrieve(outcome.record.id).await.unwrap();
        assert_eq!(got.bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_corrupted_upload_records_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("report.pdf", b"<html>oops</html>".to_vec());
        let err = alice.upload_input(input, true).await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupted { .. }));
        assert!(alice.my_files().await.unwrap().is_empty());
        assert_eq!(alice.usage().count("local", "upload"), 0);
    }

    #[tokio::test]
    async fn test_missing_key_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("a.txt", b"secret".to_vec());
        let id = alice.upload_input(input, true).await.unwrap().record.id;

        // same account, fresh key store
        let mut other_device = open(&ctx, ALICE);
        assert!(matches!(
            other_device.retrieve(id).await.unwrap_err(),
            SessionError::MissingKey(_)
        ));
    }

    #[tokio::test]
    async fn test_stranger_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);
        let mut mallory = open(&ctx, "0xbad");

        let input = FileInput::from_bytes("a.txt", b"private".to_vec());
        let id = alice.upload_input(input, false).await.unwrap().record.id;

        assert!(matches!(
            mallory.retrieve(id).await.unwrap_err(),
            SessionError::AccessDenied { .. }
        ));
        assert!(matches!(
            mallory.share(id, "0xbad2").await.unwrap_err(),
            SessionError::NotOwner(_)
        ));
        assert!(matches!(
            mallory.delete(id).await.unwrap_err(),
            SessionError::NotOwner(_)
        ));
    }

    #[tokio::test]
    async fn test_share_with_self_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("a.txt", b"mine".to_vec());
        let id = alice.upload_input(input, true).await.unwrap().record.id;

        // case differences still name the same account
        let err = alice.share(id, &ALICE.to_lowercase()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidShare(_)));
        assert!(matches!(
            alice.share(id, "").await.unwrap_err(),
            SessionError::Envelope(EnvelopeError::MissingAddress)
        ));
    }

    #[tokio::test]
    async fn test_share_rejects_path_like_recipient() {
        let tmp = tempfile::tempdir().unwrap();
        let keys_dir = tmp.path().join("keys");
        let ctx = context(&keys_dir);
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("a.txt", b"mine".to_vec());
        let id = alice.upload_input(input, true).await.unwrap().record.id;

        for recipient in ["../escaped", "sub/dir", "..\\escaped"] {
            assert!(matches!(
                alice.share(id, recipient).await.unwrap_err(),
                SessionError::InvalidAddress(_)
            ));
        }
        assert!(!tmp.path().join("escaped.json").exists());
        assert!(!keys_dir.exists());
        assert!(ctx.registry.get(id).await.unwrap().shared_with.is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_key() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path());
        let mut alice = open(&ctx, ALICE);

        let input = FileInput::from_bytes("a.txt", b"gone soon".to_vec());
        let id = alice.upload_input(input, true).await.unwrap().record.id;

        alice.delete(id).await.unwrap();
        assert!(alice.my_files().await.unwrap().is_empty());
        assert!(alice.wrapped_key(id).is_err());
        assert!(matches!(
            alice.retrieve(id).await.unwrap_err(),
            SessionError::FileNotFound(_)
        ));
    }
}
