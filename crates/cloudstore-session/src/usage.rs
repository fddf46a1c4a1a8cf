//! Per-service API usage counters
//!
//! Counts are best-effort: a failed write is logged and the in-memory
//! counters keep going.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// `service -> operation -> count`
pub type UsageStats = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Default)]
pub struct UsageTracker {
    path: Option<PathBuf>,
    stats: UsageStats,
}

impl UsageTracker {
    /// Counters that are never written anywhere
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load counters from `path`. A missing or unreadable file starts from zero.
    pub fn open(path: &Path) -> Self {
        let stats = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "discarding unreadable usage stats: {e}");
                UsageStats::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UsageStats::new(),
            Err(e) => {
                warn!(path = %path.display(), "failed to read usage stats: {e}");
                UsageStats::new()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            stats,
        }
    }

    /// Count one `operation` against `service`.
    pub fn track(&mut self, service: &str, operation: &str) {
        *self
            .stats
            .entry(service.to_string())
            .or_default()
            .entry(operation.to_string())
            .or_default() += 1;
        self.save();
    }

    pub fn count(&self, service: &str, operation: &str) -> u64 {
        self.stats
            .get(service)
            .and_then(|ops| ops.get(operation))
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> UsageStats {
        self.stats.clone()
    }

    pub fn reset(&mut self) {
        self.stats.clear();
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomic(path, &self.stats) {
            warn!(path = %path.display(), "failed to save usage stats: {e}");
        }
    }
}

fn write_atomic(path: &Path, stats: &UsageStats) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(stats)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_count() {
        let mut usage = UsageTracker::in_memory();
        usage.track("pinata", "upload");
        usage.track("pinata", "upload");
        usage.track("filebase", "upload");

        assert_eq!(usage.count("pinata", "upload"), 2);
        assert_eq!(usage.count("filebase", "upload"), 1);
        assert_eq!(usage.count("pinata", "fetch"), 0);
        assert_eq!(usage.snapshot().len(), 2);
    }

    #[test]
    fn test_persisted_and_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("usage.json");

        let mut usage = UsageTracker::open(&path);
        usage.track("local", "upload");
        usage.track("local", "fetch");

        let mut reopened = UsageTracker::open(&path);
        assert_eq!(reopened.count("local", "upload"), 1);
        assert_eq!(reopened.count("local", "fetch"), 1);

        reopened.reset();
        assert!(UsageTracker::open(&path).snapshot().is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("usage.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let mut usage = UsageTracker::open(&path);
        assert!(usage.snapshot().is_empty());
        usage.track("pinata", "upload");
        assert_eq!(UsageTracker::open(&path).count("pinata", "upload"), 1);
    }

    #[test]
    fn test_unwritable_path_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        // parent is a file, so create_dir_all fails
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let mut usage = UsageTracker::open(&blocker.join("usage.json"));
        usage.track("pinata", "upload");
        assert_eq!(usage.count("pinata", "upload"), 1);
    }
}
