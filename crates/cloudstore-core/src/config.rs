use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level client configuration (loaded from cloudstore.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudStoreConfig {
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root directory for local session state
    pub data_dir: PathBuf,
    /// Local ledger stand-in (default: {data_dir}/registry.json)
    pub registry_file: Option<PathBuf>,
    /// Per-account wrapped key stores (default: {data_dir}/keys)
    pub keys_dir: Option<PathBuf>,
    /// Usage counters (default: {data_dir}/usage.json)
    pub usage_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Blob providers tried in order: "pinata", "filebase", "local"
    pub providers: Vec<String>,
    /// Pinata API endpoint
    pub pinata_endpoint: String,
    /// Pinata public gateway used for fetches and returned URLs
    pub pinata_gateway: String,
    /// Filebase API endpoint
    pub filebase_endpoint: String,
    /// Filebase public gateway
    pub filebase_gateway: String,
    /// Filesystem root for the "local" OpenDAL provider
    pub local_root: PathBuf,
    /// Object prefix inside the local provider
    pub local_prefix: String,
    /// Reject plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
}

/// Envelope encryption configuration.
///
/// The salt and iteration count are part of the wrapped-key compatibility
/// contract: changing either makes previously wrapped keys unrecoverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Encrypt uploads unless the user opts out
    pub encrypt_by_default: bool,
    /// PBKDF2 salt shared by every account
    pub kdf_salt: String,
    /// PBKDF2 iteration count
    pub kdf_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.local/share/cloudstore"),
            registry_file: None,
            keys_dir: None,
            usage_file: None,
        }
    }
}

impl SessionConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| expand_tilde(&self.data_dir).join("registry.json"))
    }

    pub fn keys_path(&self) -> PathBuf {
        self.keys_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| expand_tilde(&self.data_dir).join("keys"))
    }

    pub fn usage_path(&self) -> PathBuf {
        self.usage_file
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| expand_tilde(&self.data_dir).join("usage.json"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            providers: vec!["pinata".into(), "filebase".into()],
            pinata_endpoint: "https://api.pinata.cloud".into(),
            pinata_gateway: "https://gateway.pinata.cloud".into(),
            filebase_endpoint: "https://api.filebase.io/v1".into(),
            filebase_gateway: "https://ipfs.filebase.io".into(),
            local_root: PathBuf::from("~/.local/share/cloudstore/blobs"),
            local_prefix: "cloudstore".into(),
            enforce_tls: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            encrypt_by_default: false,
            kdf_salt: "CloudStore_Salt_2025".into(),
            kdf_iterations: 1000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
