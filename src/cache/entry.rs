//! Cache entry records and size helpers

use crate::fingerprint::PackageFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One materialized artifact in the local store
///
/// Persisted as a JSON sidecar next to the artifact. The artifact file's
/// presence, not the sidecar, decides whether an entry exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: PackageFingerprint,
    pub storage_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a record for a freshly published artifact
    pub fn new(fingerprint: PackageFingerprint, storage_path: PathBuf, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            fingerprint,
            storage_path,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Whether the entry has not been read since `cutoff`
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_accessed_at < cutoff
    }
}

/// Aggregate numbers for the whole store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Result of a prune or clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub removed: usize,
    pub freed_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2), "1.5 GB");
    }

    #[test]
    fn idle_since() {
        let fp = PackageFingerprint::compute("a", "1.0.0", "sha512-x", "").unwrap();
        let mut entry = CacheEntry::new(fp, PathBuf::from("/x"), 1);
        entry.last_accessed_at = Utc::now() - chrono::Duration::days(10);
        assert!(entry.is_idle_since(Utc::now() - chrono::Duration::days(5)));
        assert!(!entry.is_idle_since(Utc::now() - chrono::Duration::days(20)));
    }
}
