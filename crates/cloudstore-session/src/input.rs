//! Whole-file reads for upload

use std::path::Path;
use tracing::debug;

use crate::error::SessionError;

/// A file fully read into memory
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileInput {
    /// Build an input from in-memory bytes, guessing the MIME type from `name`.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: guess_mime(Path::new(name)),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Read the whole file at `path`, suspending until every byte is in memory.
pub async fn read_all(path: &Path) -> Result<FileInput, SessionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| SessionError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    debug!(path = %path.display(), size = bytes.len(), "file read");
    Ok(FileInput {
        mime_type: guess_mime(path),
        name,
        bytes,
    })
}
