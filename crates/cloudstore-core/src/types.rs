use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CloudStoreError, CloudStoreResult};

/// Ledger-assigned integer identifier of an uploaded file
pub type FileId = u64;

/// A wallet account address in canonical form (trimmed, lowercased).
///
/// The address is used as an identifier, as key-derivation input, and as a
/// file name for per-account key stores, so only ASCII letters, digits,
/// `-` and `_` are accepted. Checksums and chain formats are not validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Canonicalize and validate an address string.
    pub fn parse(raw: &str) -> CloudStoreResult<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CloudStoreError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...abcd` style abbreviation for display
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = CloudStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = CloudStoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

/// Metadata recorded in the ledger for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Content hash returned by the blob store
    pub hash: String,
    /// Blob provider that accepted the upload
    #[serde(default)]
    pub provider: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub owner: WalletAddress,
    /// Unix timestamp (seconds) of the upload
    pub uploaded_at: u64,
    /// Whether the stored blob is an envelope-encrypted payload
    #[serde(default)]
    pub encrypted: bool,
    /// Addresses the owner has granted access to
    #[serde(default)]
    pub shared_with: Vec<WalletAddress>,
}

impl FileRecord {
    /// True if `address` owns the file or has been granted access
    pub fn is_accessible_by(&self, address: &WalletAddress) -> bool {
        &self.owner == address || self.shared_with.contains(address)
    }
}

/// Result of a successful blob upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHandle {
    /// Content hash (IPFS CID for pinning gateways, BLAKE3 hex for OpenDAL)
    pub hash: String,
    /// Gateway URL the blob can be fetched from
    pub url: String,
    /// Name of the provider that accepted the upload
    pub provider: String,
}
