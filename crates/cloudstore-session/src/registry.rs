//! File registry: ownership, metadata, and share grants
//!
//! [`FileRegistry`] is the seam where an on-chain ledger plugs in. The
//! registry decides ids and enforces who may share or delete; it knows
//! nothing about keys or ciphertext.

use async_trait::async_trait;
use cloudstore_core::{FileId, FileRecord, WalletAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SessionError;

/// Metadata for a file about to be recorded
#[derive(Debug, Clone)]
pub struct NewFile {
    pub hash: String,
    pub provider: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub owner: WalletAddress,
    pub encrypted: bool,
}

#[async_trait]
pub trait FileRegistry: Send + Sync {
    /// Record a new file and return it with its assigned id.
    async fn upload(&self, file: NewFile) -> Result<FileRecord, SessionError>;

    async fn get(&self, id: FileId) -> Result<FileRecord, SessionError>;

    async fn list_by_owner(&self, owner: &WalletAddress) -> Result<Vec<FileRecord>, SessionError>;

    async fn list_shared_with(
        &self,
        address: &WalletAddress,
    ) -> Result<Vec<FileRecord>, SessionError>;

    /// Grant `recipient` access. Only the owner may share, and not with
    /// themselves.
    async fn share(
        &self,
        id: FileId,
        caller: &WalletAddress,
        recipient: &WalletAddress,
    ) -> Result<(), SessionError>;

    /// Remove the record. Only the owner may delete.
    async fn delete(&self, id: FileId, caller: &WalletAddress) -> Result<FileRecord, SessionError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    next_id: FileId,
    files: BTreeMap<FileId, FileRecord>,
}

impl RegistryState {
    fn owned(&self, id: FileId, caller: &WalletAddress) -> Result<&FileRecord, SessionError> {
        let record = self.files.get(&id).ok_or(SessionError::FileNotFound(id))?;
        if &record.owner != caller {
            return Err(SessionError::NotOwner(id));
        }
        Ok(record)
    }
}

/// Local JSON-file registry for offline use and tests.
///
/// Ids start at 1 and are never reused, even after deletion.
pub struct LocalRegistry {
    path: Option<PathBuf>,
    state: Mutex<RegistryState>,
}

impl LocalRegistry {
    /// Registry that lives only as long as this value
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(RegistryState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Load the registry at `path`, starting empty if the file does not exist.
    pub async fn open(path: &Path) -> Result<Self, SessionError> {
        let state = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SessionError::Registry(format!("parsing {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState {
                next_id: 1,
                ..Default::default()
            },
            Err(e) => {
                return Err(SessionError::Registry(format!(
                    "reading {}: {e}",
                    path.display()
                )))
            }
        };

        debug!(path = %path.display(), files = state.files.len(), "registry opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &RegistryState) -> Result<(), SessionError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SessionError::Registry(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| SessionError::Registry(format!("serializing registry: {e}")))?;
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            SessionError::Registry(format!("writing {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            SessionError::Registry(format!("renaming {}: {e}", path.display()))
        })?;
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl FileRegistry for LocalRegistry {
    async fn upload(&self, file: NewFile) -> Result<FileRecord, SessionError> {
        let mut state = self.state.lock().await;
        let id = state.next_id.max(1);
        let record = FileRecord {
            id,
            hash: file.hash,
            provider: file.provider,
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            owner: file.owner,
            uploaded_at: now_secs(),
            encrypted: file.encrypted,
            shared_with: Vec::new(),
        };
        state.files.insert(id, record.clone());
        state.next_id = id + 1;

        if let Err(e) = self.persist(&state).await {
            state.files.remove(&id);
            state.next_id = id;
            return Err(e);
        }
        info!(id, name = %record.name, owner = %record.owner.short(), "file recorded");
        Ok(record)
    }

    async fn get(&self, id: FileId) -> Result<FileRecord, SessionError> {
        let state = self.state.lock().await;
        state
            .files
            .get(&id)
            .cloned()
            .ok_or(SessionError::FileNotFound(id))
    }

    async fn list_by_owner(&self, owner: &WalletAddress) -> Result<Vec<FileRecord>, SessionError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect())
    }

    async fn list_shared_with(
        &self,
        address: &WalletAddress,
    ) -> Result<Vec<FileRecord>, SessionError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .filter(|r| r.shared_with.contains(address))
            .cloned()
            .collect())
    }

    async fn share(
        &self,
        id: FileId,
        caller: &WalletAddress,
        recipient: &WalletAddress,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        state.owned(id, caller)?;
        if recipient == caller {
            return Err(SessionError::InvalidShare(
                "cannot share a file with its owner".into(),
            ));
        }

        let Some(record) = state.files.get_mut(&id) else {
            return Err(SessionError::FileNotFound(id));
        };
        if record.shared_with.contains(recipient) {
            return Ok(());
        }
        record.shared_with.push(recipient.clone());

        if let Err(e) = self.persist(&state).await {
            if let Some(record) = state.files.get_mut(&id) {
                record.shared_with.retain(|a| a != recipient);
            }
            return Err(e);
        }
        info!(id, recipient = %recipient.short(), "file shared");
        Ok(())
    }

    async fn delete(&self, id: FileId, caller: &WalletAddress) -> Result<FileRecord, SessionError> {
        let mut state = self.state.lock().await;
        state.owned(id, caller)?;
        let Some(record) = state.files.remove(&id) else {
            return Err(SessionError::FileNotFound(id));
        };

        if let Err(e) = self.persist(&state).await {
            state.files.insert(id, record);
            return Err(e);
        }
        info!(id, "file deleted");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    fn new_file(owner: &WalletAddress, name: &str) -> NewFile {
        NewFile {
            hash: format!("hash-{name}"),
            provider: "local".into(),
            name: name.into(),
            mime_type: "text/plain".into(),
            size: 4,
            owner: owner.clone(),
            encrypted: false,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential_and_not_reused() {
        let reg = LocalRegistry::in_memory();
        let alice = addr("0xa11ce");

        let a = reg.upload(new_file(&alice, "a")).await.unwrap();
        let b = reg.upload(new_file(&alice, "b")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        reg.delete(b.id, &alice).await.unwrap();
        let c = reg.upload(new_file(&alice, "c")).await.unwrap();
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn test_listing() {
        let reg = LocalRegistry::in_memory();
        let alice = addr("0xa11ce");
        let bob = addr("0xb0b");

        let a = reg.upload(new_file(&alice, "a")).await.unwrap();
        reg.upload(new_file(&bob, "b")).await.unwrap();
        reg.share(a.id, &alice, &bob).await.unwrap();

        let owned = reg.list_by_owner(&alice).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "a");

        let shared = reg.list_shared_with(&bob).await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, a.id);
        assert!(reg.list_shared_with(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_share_rules() {
        let reg = LocalRegistry::in_memory();
        let alice = addr("0xa11ce");
        let bob = addr("0xb0b");
        let a = reg.upload(new_file(&alice, "a")).await.unwrap();

        assert!(matches!(
            reg.share(a.id, &bob, &alice).await.unwrap_err(),
            SessionError::NotOwner(_)
        ));
        assert!(matches!(
            reg.share(a.id, &alice, &alice).await.unwrap_err(),
            SessionError::InvalidShare(_)
        ));
        assert!(matches!(
            reg.share(99, &alice, &bob).await.unwrap_err(),
            SessionError::FileNotFound(99)
        ));

        // sharing twice is a no-op
        reg.share(a.id, &alice, &bob).await.unwrap();
        reg.share(a.id, &alice, &bob).await.unwrap();
        assert_eq!(reg.get(a.id).await.unwrap().shared_with, vec![bob]);
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let reg = LocalRegistry::in_memory();
        let alice = addr("0xa11ce");
        let bob = addr("0xb0b");
        let a = reg.upload(new_file(&alice, "a")).await.unwrap();

        assert!(matches!(
            reg.delete(a.id, &bob).await.unwrap_err(),
            SessionError::NotOwner(_)
        ));
        reg.delete(a.id, &alice).await.unwrap();
        assert!(matches!(
            reg.get(a.id).await.unwrap_err(),
            SessionError::FileNotFound(_)
        ));
        assert!(matches!(
            reg.share(a.id, &alice, &bob).await.unwrap_err(),
            SessionError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_json_registry_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("registry.json");
        let alice = addr("0xa11ce");
        let bob = addr("0xb0b");

        {
            let reg = LocalRegistry::open(&path).await.unwrap();
            let a = reg.upload(new_file(&alice, "a")).await.unwrap();
            reg.share(a.id, &alice, &bob).await.unwrap();
        }

        let reg = LocalRegistry::open(&path).await.unwrap();
        let record = reg.get(1).await.unwrap();
        assert_eq!(record.name, "a");
        assert_eq!(record.shared_with, vec![bob]);
        assert_eq!(reg.upload(new_file(&alice, "b")).await.unwrap().id, 2);
    }
}
