//! Whole-tree snapshot archives (zstd-compressed tar)

use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::lockfile::{manifest_hash, ResolvedSet};
use crate::snapshot::manifest::{Snapshot, SnapshotManifest, FORMAT_VERSION, MANIFEST_ENTRY};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Freshness of a project's snapshot
#[derive(Debug, Clone)]
pub enum SnapshotStatus {
    /// Matches the current lockfile
    Fresh(SnapshotManifest),
    /// Taken from a different lockfile
    Stale {
        manifest: SnapshotManifest,
        current_hash: String,
    },
    Missing,
}

impl SnapshotStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh(_) => "fresh",
            Self::Stale { .. } => "stale",
            Self::Missing => "missing",
        }
    }
}

/// Creates and restores project snapshots
#[derive(Debug, Clone)]
pub struct SnapshotArchiver {
    file_name: String,
    modules_dir: String,
    compression_level: i32,
}

impl SnapshotArchiver {
    pub fn new(file_name: impl Into<String>, modules_dir: impl Into<String>, compression_level: i32) -> Self {
        Self {
            file_name: file_name.into(),
            modules_dir: modules_dir.into(),
            compression_level,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.snapshot.file_name.clone(),
            config.install.modules_dir.clone(),
            config.snapshot.compression_level,
        )
    }

    /// Archive location for `project`
    pub fn archive_path(&self, project: &Path) -> PathBuf {
        project.join(&self.file_name)
    }

    /// Archive the installed tree of `project`
    ///
    /// Every resolved package must be installed at the version the lockfile
    /// names; otherwise nothing is written and `SnapshotDrift` lists the
    /// offenders.
    pub async fn create(&self, project: &Path, resolved: &ResolvedSet) -> PackratResult<Snapshot> {
        let this = self.clone();
        let project = project.to_path_buf();
        let resolved = resolved.clone();
        blocking(move || this.create_blocking(&project, &resolved)).await
    }

    /// Restore the project's own snapshot
    pub async fn restore(&self, project: &Path) -> PackratResult<SnapshotManifest> {
        let archive = self.archive_path(project);
        self.restore_from(project, &archive).await
    }

    /// Restore `archive` into `project`
    ///
    /// Fails with `SnapshotStale` before touching anything when the
    /// project's lockfile changed since the archive was taken.
    pub async fn restore_from(&self, project: &Path, archive: &Path) -> PackratResult<SnapshotManifest> {
        let this = self.clone();
        let project = project.to_path_buf();
        let archive = archive.to_path_buf();
        blocking(move || this.restore_blocking(&project, &archive)).await
    }

    /// Read an archive's manifest without extracting anything
    pub async fn inspect(&self, archive: &Path) -> PackratResult<SnapshotManifest> {
        let archive = archive.to_path_buf();
        blocking(move || read_manifest(&archive)).await
    }

    /// Compare the project's snapshot against its current lockfile
    pub async fn status(&self, project: &Path) -> PackratResult<SnapshotStatus> {
        let archive = self.archive_path(project);
        if !archive.is_file() {
            return Ok(SnapshotStatus::Missing);
        }
        let manifest = self.inspect(&archive).await?;
        let current_hash = manifest_hash(project)?;
        if current_hash == manifest.project_manifest_hash {
            Ok(SnapshotStatus::Fresh(manifest))
        } else {
            Ok(SnapshotStatus::Stale {
                manifest,
                current_hash,
            })
        }
    }

    /// Remove the project's snapshot; returns whether one existed
    pub async fn delete(&self, project: &Path) -> PackratResult<bool> {
        let archive = self.archive_path(project);
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {
                info!("Removed snapshot {}", archive.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PackratError::io(format!("removing {}", archive.display()), e)),
        }
    }

    fn create_blocking(&self, project: &Path, resolved: &ResolvedSet) -> PackratResult<Snapshot> {
        let drift = find_drift(project, resolved);
        if !drift.is_empty() {
            return Err(PackratError::SnapshotDrift(drift));
        }

        let entries = resolved
            .packages
            .iter()
            .map(|p| p.fingerprint())
            .collect::<PackratResult<Vec<_>>>()?;
        let manifest = SnapshotManifest::new(resolved.lockfile.hash.clone(), entries, &self.modules_dir);

        let archive = self.archive_path(project);
        let tmp = archive.with_file_name(format!("{}.tmp-{}", self.file_name, uuid::Uuid::new_v4()));

        if let Err(e) = self.write_archive(project, &manifest, &tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &archive) {
            let _ = fs::remove_file(&tmp);
            return Err(PackratError::io(format!("publishing {}", archive.display()), e));
        }

        let size = fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);
        info!(
            "Snapshot {} written ({} packages) to {}",
            manifest.id,
            manifest.entries.len(),
            archive.display()
        );
        Ok(Snapshot::from_manifest(manifest, archive, size))
    }

    fn write_archive(&self, project: &Path, manifest: &SnapshotManifest, dst: &Path) -> PackratResult<()> {
        let archive_err = |reason: String| PackratError::SnapshotInvalid {
            path: dst.to_path_buf(),
            reason,
        };

        let file = File::create(dst).map_err(|e| PackratError::io(format!("creating {}", dst.display()), e))?;
        let enc = zstd::Encoder::new(file, self.compression_level)
            .map_err(|e| archive_err(format!("zstd encoder error: {}", e)))?;
        let mut builder = tar::Builder::new(enc);
        builder.follow_symlinks(false);

        let json = serde_json::to_vec_pretty(manifest)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(manifest.created_at.timestamp().max(0) as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, MANIFEST_ENTRY, json.as_slice())
            .map_err(|e| PackratError::io(format!("writing {}", dst.display()), e))?;

        let modules = project.join(&self.modules_dir);
        if modules.is_dir() {
            builder
                .append_dir_all(&self.modules_dir, &modules)
                .map_err(|e| PackratError::io(format!("archiving {}", modules.display()), e))?;
        }

        let enc = builder
            .into_inner()
            .map_err(|e| PackratError::io(format!("finalizing {}", dst.display()), e))?;
        let file = enc
            .finish()
            .map_err(|e| PackratError::io(format!("finalizing {}", dst.display()), e))?;
        file.sync_all()
            .map_err(|e| PackratError::io(format!("syncing {}", dst.display()), e))
    }

    fn restore_blocking(&self, project: &Path, archive: &Path) -> PackratResult<SnapshotManifest> {
        if !archive.is_file() {
            return Err(PackratError::SnapshotNotFound(archive.to_path_buf()));
        }

        let manifest = read_manifest(archive)?;
        let current = manifest_hash(project)?;
        if current != manifest.project_manifest_hash {
            return Err(PackratError::SnapshotStale {
                expected: manifest.project_manifest_hash,
                current,
            });
        }

        let staging = project.join(format!(".packrat-restore-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)
            .map_err(|e| PackratError::io(format!("creating {}", staging.display()), e))?;

        let result = unpack_tree(archive, &staging, &manifest.modules_dir)
            .and_then(|_| swap_modules(project, &staging, &manifest.modules_dir));
        if let Err(e) = fs::remove_dir_all(&staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", staging.display(), e);
            }
        }
        result?;

        info!(
            "Restored snapshot {} ({} packages)",
            manifest.id,
            manifest.entries.len()
        );
        Ok(manifest)
    }
}

async fn blocking<T, F>(f: F) -> PackratResult<T>
where
    F: FnOnce() -> PackratResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PackratError::Internal(format!("snapshot task failed: {}", e)))?
}

fn open_archive(path: &Path) -> PackratResult<tar::Archive<zstd::Decoder<'static, BufReader<File>>>> {
    let file = File::open(path).map_err(|e| PackratError::io(format!("opening {}", path.display()), e))?;
    let dec = zstd::Decoder::new(file).map_err(|e| PackratError::SnapshotInvalid {
        path: path.to_path_buf(),
        reason: format!("zstd decoder error: {}", e),
    })?;
    Ok(tar::Archive::new(dec))
}

/// Read only the first entry, which must be the manifest
fn read_manifest(path: &Path) -> PackratResult<SnapshotManifest> {
    let invalid = |reason: String| PackratError::SnapshotInvalid {
        path: path.to_path_buf(),
        reason,
    };
    if !path.is_file() {
        return Err(PackratError::SnapshotNotFound(path.to_path_buf()));
    }

    let mut archive = open_archive(path)?;
    let mut entries = archive
        .entries()
        .map_err(|e| invalid(format!("unreadable archive: {}", e)))?;
    let mut first = entries
        .next()
        .ok_or_else(|| invalid("archive is empty".to_string()))?
        .map_err(|e| invalid(format!("unreadable archive: {}", e)))?;

    let name = first
        .path()
        .map_err(|e| invalid(format!("bad entry path: {}", e)))?
        .into_owned();
    if name != Path::new(MANIFEST_ENTRY) {
        return Err(invalid(format!(
            "first entry is {}, expected {}",
            name.display(),
            MANIFEST_ENTRY
        )));
    }

    let mut json = Vec::new();
    first
        .read_to_end(&mut json)
        .map_err(|e| invalid(format!("reading manifest: {}", e)))?;
    let manifest: SnapshotManifest =
        serde_json::from_slice(&json).map_err(|e| invalid(format!("bad manifest: {}", e)))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(invalid(format!(
            "unsupported snapshot format {}",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Stream every tree entry into `staging`
fn unpack_tree(archive: &Path, staging: &Path, modules_dir: &str) -> PackratResult<()> {
    let invalid = |reason: String| PackratError::SnapshotInvalid {
        path: archive.to_path_buf(),
        reason,
    };

    let mut tar = open_archive(archive)?;
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let entries = tar
        .entries()
        .map_err(|e| invalid(format!("unreadable archive: {}", e)))?;
    for entry in entries.skip(1) {
        let mut entry = entry.map_err(|e| invalid(format!("corrupt entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| invalid(format!("bad entry path: {}", e)))?
            .into_owned();
        if !path.starts_with(modules_dir) {
            return Err(invalid(format!("unexpected entry {}", path.display())));
        }
        // unpack_in refuses entries that would escape `staging`
        let unpacked = entry
            .unpack_in(staging)
            .map_err(|e| PackratError::io(format!("extracting {}", path.display()), e))?;
        if !unpacked {
            return Err(invalid(format!("entry {} escapes the project", path.display())));
        }
    }
    Ok(())
}

/// Move the staged modules dir into place, replacing the old tree
fn swap_modules(project: &Path, staging: &Path, modules_dir: &str) -> PackratResult<()> {
    let staged = staging.join(modules_dir);
    let target = project.join(modules_dir);
    if !staged.exists() {
        fs::create_dir_all(&staged)
            .map_err(|e| PackratError::io(format!("creating {}", staged.display()), e))?;
    }

    let aside = project.join(format!(".packrat-old-{}", uuid::Uuid::new_v4()));
    let had_old = match fs::rename(&target, &aside) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(PackratError::io(format!("moving {} aside", target.display()), e)),
    };

    if let Err(e) = fs::rename(&staged, &target) {
        if had_old {
            let _ = fs::rename(&aside, &target);
        }
        return Err(PackratError::io(format!("moving restored tree into {}", target.display()), e));
    }

    if had_old {
        if let Err(e) = fs::remove_dir_all(&aside) {
            warn!("Could not remove previous tree {}: {}", aside.display(), e);
        }
    }
    debug!("Swapped restored tree into {}", target.display());
    Ok(())
}

#[derive(Deserialize)]
struct InstalledPackage {
    name: Option<String>,
    version: Option<String>,
}

/// Packages whose installed `package.json` disagrees with the lockfile
fn find_drift(project: &Path, resolved: &ResolvedSet) -> Vec<String> {
    let mut drift = Vec::new();
    for pkg in &resolved.packages {
        let manifest = project.join(&pkg.install_path).join("package.json");
        let expected = format!("{}@{}", pkg.name, pkg.version);

        let installed: InstalledPackage = match fs::read(&manifest)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
        {
            Some(p) => p,
            None => {
                drift.push(format!("{} (not installed)", expected));
                continue;
            }
        };

        if installed.name.as_deref() != Some(pkg.name.as_str())
            || installed.version.as_deref() != Some(pkg.version.as_str())
        {
            drift.push(format!(
                "{} (found {}@{})",
                expected,
                installed.name.as_deref().unwrap_or("?"),
                installed.version.as_deref().unwrap_or("?")
            ));
        }
    }
    drift
}
