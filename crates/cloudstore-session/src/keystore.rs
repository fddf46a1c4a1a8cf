//! Wrapped-key stores
//!
//! A session holds exactly one [`KeyStore`], scoped to its active address.
//! Keys granted by other accounts arrive through [`KeyDelivery`], which writes
//! into the recipient's store rather than the sharer's.
//!
//! Only [`WrappedKey`]s are ever stored; content keys never touch disk.

use cloudstore_core::{FileId, WalletAddress};
use cloudstore_crypto::WrappedKey;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SessionError;

/// Per-account map of file id to wrapped content key
pub trait KeyStore: Send {
    fn get(&self, file_id: FileId) -> Option<WrappedKey>;
    fn put(&mut self, file_id: FileId, key: WrappedKey) -> Result<(), SessionError>;
    fn remove(&mut self, file_id: FileId) -> Result<Option<WrappedKey>, SessionError>;
}

/// Hands a wrapped key to another account's key store.
pub trait KeyDelivery: Send + Sync {
    fn deliver(
        &self,
        recipient: &WalletAddress,
        file_id: FileId,
        key: WrappedKey,
    ) -> Result<(), SessionError>;
}

/// Volatile key store for tests and one-shot sessions
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: BTreeMap<FileId, WrappedKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, file_id: FileId) -> Option<WrappedKey> {
        self.keys.get(&file_id).cloned()
    }

    fn put(&mut self, file_id: FileId, key: WrappedKey) -> Result<(), SessionError> {
        self.keys.insert(file_id, key);
        Ok(())
    }

    fn remove(&mut self, file_id: FileId) -> Result<Option<WrappedKey>, SessionError> {
        Ok(self.keys.remove(&file_id))
    }
}

/// Key store persisted as one JSON file, wrapped keys in base64.
///
/// Other writers (key delivery, another session) may update the same file,
/// so every flush re-reads it and applies only this store's own changes on
/// top. A lookup that misses in memory checks the file again. Writes are
/// atomic (temp file, then rename); a failed flush keeps its changes
/// pending and is retried on drop.
pub struct JsonKeyStore {
    path: PathBuf,
    keys: BTreeMap<FileId, WrappedKey>,
    /// `Some` = put, `None` = remove; not yet on disk
    pending: BTreeMap<FileId, Option<WrappedKey>>,
}

fn read_keys(path: &Path) -> Result<BTreeMap<FileId, WrappedKey>, SessionError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(SessionError::KeyStore(format!(
                "reading {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&content)
        .map_err(|e| SessionError::KeyStore(format!("parsing {}: {e}", path.display())))
}

impl JsonKeyStore {
    /// Load the store at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        let keys = read_keys(path)?;
        debug!(path = %path.display(), keys = keys.len(), "key store opened");
        Ok(Self {
            path: path.to_path_buf(),
            keys,
            pending: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Merge pending changes into the current file contents and write the
    /// result (temp file, then rename).
    pub fn flush(&mut self) -> Result<(), SessionError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut merged = read_keys(&self.path)?;
        for (file_id, change) in &self.pending {
            match change {
                Some(key) => {
                    merged.insert(*file_id, key.clone());
                }
                None => {
                    merged.remove(file_id);
                }
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::KeyStore(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(&merged)
            .map_err(|e| SessionError::KeyStore(format!("serializing keys: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            SessionError::KeyStore(format!("writing {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            SessionError::KeyStore(format!("renaming {}: {e}", self.path.display()))
        })?;

        self.keys = merged;
        self.pending.clear();
        Ok(())
    }
}

impl KeyStore for JsonKeyStore {
    fn get(&self, file_id: FileId) -> Option<WrappedKey> {
        if let Some(key) = self.keys.get(&file_id) {
            return Some(key.clone());
        }
        if self.pending.contains_key(&file_id) {
            return None;
        }
        match read_keys(&self.path) {
            Ok(on_disk) => on_disk.get(&file_id).cloned(),
            Err(e) => {
                warn!("key store re-read failed: {e}");
                None
            }
        }
    }

    fn put(&mut self, file_id: FileId, key: WrappedKey) -> Result<(), SessionError> {
        self.keys.insert(file_id, key.clone());
        self.pending.insert(file_id, Some(key));
        self.flush()
    }

    fn remove(&mut self, file_id: FileId) -> Result<Option<WrappedKey>, SessionError> {
        let removed = self.keys.remove(&file_id);
        self.pending.insert(file_id, None);
        self.flush()?;
        Ok(removed)
    }
}

impl Drop for JsonKeyStore {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            if let Err(e) = self.flush() {
                warn!("failed to flush key store on drop: {e}");
            }
        }
    }
}

/// Directory of per-account [`JsonKeyStore`] files named `{address}.json`
#[derive(Debug, Clone)]
pub struct JsonKeyDirectory {
    dir: PathBuf,
}

impl JsonKeyDirectory {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn store_path(&self, address: &WalletAddress) -> PathBuf {
        self.dir.join(format!("{}.json", address.as_str()))
    }

    pub fn open(&self, address: &WalletAddress) -> Result<JsonKeyStore, SessionError> {
        JsonKeyStore::open(&self.store_path(address))
    }
}

impl KeyDelivery for JsonKeyDirectory {
    fn deliver(
        &self,
        recipient: &WalletAddress,
        file_id: FileId,
        key: WrappedKey,
    ) -> Result<(), SessionError> {
        let mut store = self.open(recipient)?;
        store.put(file_id, key)?;
        debug!(recipient = %recipient.short(), file_id, "wrapped key delivered");
        Ok(())
    }
}
