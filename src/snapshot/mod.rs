//! Portable snapshots of a fully installed dependency tree
//!
//! A snapshot is one zstd-compressed tar at the project root. Its first
//! entry is the manifest (fingerprints plus the lockfile hash); the modules
//! tree follows. A snapshot is only valid for the lockfile it was taken
//! from.

pub mod archive;
pub mod manifest;

pub use archive::{SnapshotArchiver, SnapshotStatus};
pub use manifest::{snapshot_id, Snapshot, SnapshotManifest, MANIFEST_ENTRY};
