//! Read-only project inspection and modules cleanup

use crate::cache::{CacheStats, CacheStore};
use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::lockfile::resolve_packages;
use crate::snapshot::{SnapshotArchiver, SnapshotStatus};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// What an install of the project would have to do
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub lockfile: String,
    pub lockfile_hash: String,
    pub packages: usize,
    /// Packages with a complete artifact in the local store
    pub cached: usize,
    /// Packages that would be fetched from cloud or network
    pub missing: usize,
    /// Packages present in the modules dir
    pub installed: usize,
    pub with_install_scripts: usize,
    pub cache: CacheStats,
    pub snapshot: &'static str,
    pub snapshot_id: Option<String>,
}

pub async fn analyze(project: &Path, config: &Config, store: &CacheStore) -> PackratResult<Analysis> {
    let resolved = resolve_packages(project)?;

    let mut cached = 0;
    for pkg in &resolved.packages {
        let fp = pkg.fingerprint()?;
        if store.has(&fp).await {
            cached += 1;
        }
    }
    let installed = resolved
        .packages
        .iter()
        .filter(|p| project.join(&p.install_path).join("package.json").is_file())
        .count();

    let snapshot = SnapshotArchiver::from_config(config).status(project).await?;
    let snapshot_id = match &snapshot {
        SnapshotStatus::Fresh(m) | SnapshotStatus::Stale { manifest: m, .. } => Some(m.id.clone()),
        SnapshotStatus::Missing => None,
    };

    Ok(Analysis {
        lockfile: resolved.lockfile.kind.to_string(),
        lockfile_hash: resolved.lockfile.hash.clone(),
        packages: resolved.packages.len(),
        cached,
        missing: resolved.packages.len() - cached,
        installed,
        with_install_scripts: resolved.packages.iter().filter(|p| p.has_install_script).count(),
        cache: store.stats().await?,
        snapshot: snapshot.label(),
        snapshot_id,
    })
}

/// Remove the project's modules dir; returns whether it existed
pub async fn clean_modules(project: &Path, config: &Config) -> PackratResult<bool> {
    let dir = project.join(&config.install.modules_dir);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {
            info!("Removed {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PackratError::io(format!("removing {}", dir.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::orchestrator::tests::Fixture;

    #[tokio::test]
    async fn counts_cached_and_installed_packages() {
        let fx = Fixture::new(&[
            ("left-pad", r#"{"name":"left-pad","version":"1.0.0"}"#),
            ("lodash", r#"{"name":"lodash","version":"1.0.0"}"#),
        ]);
        let config = fx.config();

        let before = analyze(&fx.project(), &config, &fx.store()).await.unwrap();
        assert_eq!(before.packages, 2);
        assert_eq!(before.missing, 2);
        assert_eq!(before.installed, 0);
        assert_eq!(before.snapshot, "missing");

        fx.installer(config.clone()).install().await.unwrap();
        let after = analyze(&fx.project(), &config, &fx.store()).await.unwrap();
        assert_eq!(after.cached, 2);
        assert_eq!(after.installed, 2);
        assert_eq!(after.cache.entries, 2);
    }

    #[tokio::test]
    async fn clean_modules_is_idempotent() {
        let fx = Fixture::new(&[("left-pad", r#"{"name":"left-pad"}"#)]);
        let config = fx.config();
        fx.installer(config.clone()).install().await.unwrap();

        assert!(clean_modules(&fx.project(), &config).await.unwrap());
        assert!(!fx.project().join("node_modules").exists());
        assert!(!clean_modules(&fx.project(), &config).await.unwrap());
    }
}
