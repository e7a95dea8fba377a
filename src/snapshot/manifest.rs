//! Snapshot manifest embedded as the first archive entry

use crate::fingerprint::PackageFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Archive entry name of the manifest
pub const MANIFEST_ENTRY: &str = "packrat-snapshot.json";

/// Bumped when the archive layout changes incompatibly
pub const FORMAT_VERSION: u32 = 1;

/// What a snapshot contains and which lockfile it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub id: String,
    /// Hash of the lockfile the tree was installed from
    pub project_manifest_hash: String,
    /// Packages in install-path order
    pub entries: Vec<PackageFingerprint>,
    /// Modules directory relative to the project root
    pub modules_dir: String,
    pub created_at: DateTime<Utc>,
}

impl SnapshotManifest {
    pub fn new(
        project_manifest_hash: String,
        entries: Vec<PackageFingerprint>,
        modules_dir: impl Into<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            id: snapshot_id(&project_manifest_hash, &entries),
            project_manifest_hash,
            entries,
            modules_dir: modules_dir.into(),
            created_at: Utc::now(),
        }
    }
}

/// Same lockfile and same package set give the same id
pub fn snapshot_id(project_manifest_hash: &str, entries: &[PackageFingerprint]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_manifest_hash.as_bytes());
    for fp in entries {
        hasher.update(b"\n");
        hasher.update(fp.key().as_bytes());
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

/// A written snapshot archive
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub project_manifest_hash: String,
    pub entries: Vec<PackageFingerprint>,
    pub archive_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl Snapshot {
    pub fn from_manifest(manifest: SnapshotManifest, archive_path: PathBuf, size_bytes: u64) -> Self {
        Self {
            id: manifest.id,
            project_manifest_hash: manifest.project_manifest_hash,
            entries: manifest.entries,
            archive_path,
            created_at: manifest.created_at,
            size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(name: &str) -> PackageFingerprint {
        PackageFingerprint::compute(name, "1.0.0", "sha512-AAAA", "").unwrap()
    }

    #[test]
    fn id_is_deterministic_and_order_sensitive() {
        let a = vec![fp("a"), fp("b")];
        let b = vec![fp("b"), fp("a")];
        assert_eq!(snapshot_id("h", &a), snapshot_id("h", &a));
        assert_ne!(snapshot_id("h", &a), snapshot_id("h", &b));
        assert_ne!(snapshot_id("h", &a), snapshot_id("other", &a));
        assert_eq!(snapshot_id("h", &a).len(), 16);
    }

    #[test]
    fn manifest_serializes() {
        let m = SnapshotManifest::new("h".into(), vec![fp("a")], "node_modules");
        let json = serde_json::to_string(&m).unwrap();
        let back: SnapshotManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
