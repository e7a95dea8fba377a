//! Content-addressed on-disk package store
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   <shard>/<key>.tgz    artifact bytes
//!   <shard>/<key>.json   CacheEntry sidecar
//! ```
//!
//! Writers stage into `<key>.tgz.tmp-<uuid>` in the same shard directory and
//! publish with a rename, so readers only ever see complete artifacts.
//! Concurrent writers of one key race harmlessly: same key, same bytes.

use crate::cache::entry::{CacheEntry, CacheStats, PruneSummary};
use crate::error::{PackratError, PackratResult};
use crate::fingerprint::{Integrity, PackageFingerprint};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const ARTIFACT_EXT: &str = "tgz";
const SIDECAR_EXT: &str = "json";
const TMP_MARKER: &str = ".tmp-";

/// Local cache store rooted at an explicit directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `root` (created lazily)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and prove it is writable
    pub async fn ensure_writable(&self) -> PackratResult<()> {
        let unwritable = |e: std::io::Error| {
            PackratError::OrchestratorFatal(format!(
                "cache directory {} is not writable: {}",
                self.root.display(),
                e
            ))
        };

        fs::create_dir_all(&self.root).await.map_err(unwritable)?;
        let probe = self
            .root
            .join(format!(".write-probe{}{}", TMP_MARKER, uuid::Uuid::new_v4()));
        fs::write(&probe, b"ok").await.map_err(unwritable)?;
        let _ = fs::remove_file(&probe).await;
        Ok(())
    }

    fn shard_dir(&self, fp: &PackageFingerprint) -> PathBuf {
        self.root.join(fp.shard())
    }

    /// Path the artifact for `fp` lives at once published
    pub fn artifact_path(&self, fp: &PackageFingerprint) -> PathBuf {
        self.shard_dir(fp)
            .join(format!("{}.{}", fp.key(), ARTIFACT_EXT))
    }

    fn sidecar_path(&self, fp: &PackageFingerprint) -> PathBuf {
        self.shard_dir(fp).join(format!("{}.{}", fp.key(), SIDECAR_EXT))
    }

    /// Fresh staging path inside the entry's shard
    ///
    /// Staging next to the final location keeps the publishing rename on
    /// one filesystem.
    pub async fn staging_path(&self, fp: &PackageFingerprint) -> PackratResult<PathBuf> {
        let shard = self.shard_dir(fp);
        fs::create_dir_all(&shard)
            .await
            .map_err(|e| PackratError::io(format!("creating shard {}", shard.display()), e))?;
        Ok(shard.join(format!(
            "{}.{}{}{}",
            fp.key(),
            ARTIFACT_EXT,
            TMP_MARKER,
            uuid::Uuid::new_v4()
        )))
    }

    /// Whether a complete artifact exists for `fp`
    pub async fn has(&self, fp: &PackageFingerprint) -> bool {
        fs::metadata(self.artifact_path(fp))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Path of the cached artifact; records the access
    pub async fn get(&self, fp: &PackageFingerprint) -> PackratResult<PathBuf> {
        let path = self.artifact_path(fp);
        if !self.has(fp).await {
            return Err(PackratError::CacheEntryNotFound(fp.spec()));
        }
        self.touch(fp).await;
        Ok(path)
    }

    /// Like [`get`](Self::get), but re-checks the artifact against the
    /// fingerprint's integrity. A corrupt entry is evicted.
    pub async fn get_verified(&self, fp: &PackageFingerprint) -> PackratResult<PathBuf> {
        let path = self.get(fp).await?;

        let integrity = match Integrity::parse(&fp.integrity) {
            Ok(i) => i,
            Err(_) => {
                debug!("{} has no parseable integrity, skipping verification", fp);
                return Ok(path);
            }
        };

        let check_path = path.clone();
        let outcome = tokio::task::spawn_blocking(move || integrity.verify_file(&check_path))
            .await
            .map_err(|e| PackratError::Internal(format!("verification task failed: {}", e)))?
            .map_err(|e| PackratError::io(format!("reading {}", path.display()), e))?;

        match outcome {
            Ok(()) => Ok(path),
            Err(actual) => {
                warn!("Cache entry for {} is corrupt, evicting", fp);
                self.evict(fp).await?;
                Err(PackratError::CacheCorruption {
                    key: fp.key(),
                    reason: format!("expected {}, found {}", fp.integrity, actual),
                })
            }
        }
    }

    /// Read the entry record, if the artifact exists
    pub async fn entry(&self, fp: &PackageFingerprint) -> PackratResult<Option<CacheEntry>> {
        let artifact = self.artifact_path(fp);
        let meta = match fs::metadata(&artifact).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PackratError::io(
                    format!("reading {}", artifact.display()),
                    e,
                ))
            }
        };

        if let Some(entry) = read_sidecar(&self.sidecar_path(fp)).await {
            return Ok(Some(entry));
        }

        // Sidecar lost (crash between renames); rebuild from the artifact
        let created: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        let mut entry = CacheEntry::new(fp.clone(), artifact, meta.len());
        entry.created_at = created;
        entry.last_accessed_at = created;
        Ok(Some(entry))
    }

    /// Copy `source` into the store under `fp`
    pub async fn put(&self, fp: &PackageFingerprint, source: &Path) -> PackratResult<CacheEntry> {
        let staging = self.staging_path(fp).await?;
        if let Err(e) = fs::copy(source, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(PackratError::io(
                format!("copying {} into cache", source.display()),
                e,
            ));
        }
        self.publish(fp, &staging).await
    }

    /// Atomically publish a fully written staging file under `fp`
    ///
    /// The staging file must come from [`staging_path`](Self::staging_path).
    pub async fn publish(&self, fp: &PackageFingerprint, staging: &Path) -> PackratResult<CacheEntry> {
        let size = match fs::metadata(staging).await {
            Ok(m) => m.len(),
            Err(e) => {
                return Err(PackratError::io(
                    format!("reading staged file {}", staging.display()),
                    e,
                ))
            }
        };

        let artifact = self.artifact_path(fp);
        if let Err(e) = fs::rename(staging, &artifact).await {
            let _ = fs::remove_file(staging).await;
            return Err(PackratError::io(
                format!("publishing {}", artifact.display()),
                e,
            ));
        }

        let entry = CacheEntry::new(fp.clone(), artifact, size);
        self.write_sidecar(fp, &entry).await;
        debug!("Cached {} ({} bytes)", fp, size);
        Ok(entry)
    }

    /// Remove an entry; removing a missing entry is not an error
    pub async fn evict(&self, fp: &PackageFingerprint) -> PackratResult<()> {
        for path in [self.artifact_path(fp), self.sidecar_path(fp)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PackratError::io(
                        format!("evicting {}", path.display()),
                        e,
                    ))
                }
            }
        }
        debug!("Evicted {}", fp);
        Ok(())
    }

    /// All complete entries
    pub async fn list(&self) -> PackratResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for shard in self.shard_dirs().await? {
            let mut dir = fs::read_dir(&shard)
                .await
                .map_err(|e| PackratError::io(format!("reading {}", shard.display()), e))?;

            while let Some(item) = dir
                .next_entry()
                .await
                .map_err(|e| PackratError::io("reading cache entry", e))?
            {
                let path = item.path();
                if path.extension().is_some_and(|ext| ext == SIDECAR_EXT) {
                    if let Some(entry) = read_sidecar(&path).await {
                        if fs::metadata(&entry.storage_path).await.is_ok() {
                            entries.push(entry);
                        }
                    }
                }
            }
        }

        entries.sort_by(|a, b| a.fingerprint.spec().cmp(&b.fingerprint.spec()));
        Ok(entries)
    }

    /// Entry count and total artifact size
    pub async fn stats(&self) -> PackratResult<CacheStats> {
        let entries = self.list().await?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
        })
    }

    /// Remove entries whose last access is older than `max_age`
    pub async fn prune(&self, max_age: chrono::Duration) -> PackratResult<PruneSummary> {
        let cutoff = Utc::now() - max_age;
        let mut summary = PruneSummary::default();

        for entry in self.list().await? {
            if entry.is_idle_since(cutoff) {
                self.evict(&entry.fingerprint).await?;
                summary.removed += 1;
                summary.freed_bytes += entry.size_bytes;
            }
        }

        info!(
            "Pruned {} cache entries ({} bytes)",
            summary.removed, summary.freed_bytes
        );
        Ok(summary)
    }

    /// Remove every entry
    pub async fn clear(&self) -> PackratResult<PruneSummary> {
        let stats = self.stats().await?;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PackratError::io(
                    format!("removing {}", self.root.display()),
                    e,
                ))
            }
        }
        Ok(PruneSummary {
            removed: stats.entries,
            freed_bytes: stats.total_bytes,
        })
    }

    /// Delete staging files abandoned by crashed writers
    ///
    /// Only files older than `grace` are touched so live writers in other
    /// processes are left alone.
    pub async fn sweep_partials(&self, grace: std::time::Duration) -> PackratResult<usize> {
        let mut removed = 0;
        for shard in self.shard_dirs().await? {
            let mut dir = fs::read_dir(&shard)
                .await
                .map_err(|e| PackratError::io(format!("reading {}", shard.display()), e))?;

            while let Some(item) = dir
                .next_entry()
                .await
                .map_err(|e| PackratError::io("reading cache entry", e))?
            {
                let is_partial = item.file_name().to_string_lossy().contains(TMP_MARKER);
                if !is_partial {
                    continue;
                }
                let stale = item
                    .metadata()
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.elapsed().ok())
                    .is_some_and(|age| age >= grace);
                if stale && fs::remove_file(item.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn shard_dirs(&self) -> PackratResult<Vec<PathBuf>> {
        let mut shards = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(shards),
            Err(e) => {
                return Err(PackratError::io(
                    format!("reading {}", self.root.display()),
                    e,
                ))
            }
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| PackratError::io("reading cache root", e))?
        {
            if item.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                shards.push(item.path());
            }
        }
        Ok(shards)
    }

    /// Bump `last_accessed_at`; failures only cost eviction accuracy
    async fn touch(&self, fp: &PackageFingerprint) {
        match self.entry(fp).await {
            Ok(Some(mut entry)) => {
                entry.last_accessed_at = Utc::now();
                self.write_sidecar(fp, &entry).await;
            }
            Ok(None) => {}
            Err(e) => debug!("Could not record access for {}: {}", fp, e),
        }
    }

    async fn write_sidecar(&self, fp: &PackageFingerprint, entry: &CacheEntry) {
        let path = self.sidecar_path(fp);
        let tmp = path.with_extension(format!("{}{}{}", SIDECAR_EXT, TMP_MARKER, uuid::Uuid::new_v4()));
        let result = async {
            let content = serde_json::to_vec_pretty(entry)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
            fs::write(&tmp, content).await?;
            fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            warn!("Failed to write cache metadata {}: {}", path.display(), e);
        }
    }
}

async fn read_sidecar(path: &Path) -> Option<CacheEntry> {
    let content = fs::read(path).await.ok()?;
    serde_json::from_slice(&content).ok()
}
