//! Sync command - push the local cache and snapshot to the cloud cache

use crate::cache::CacheStore;
use crate::cli::commands::open_cloud;
use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::lockfile::resolve_packages;
use crate::snapshot::{SnapshotArchiver, SnapshotStatus};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;
use tracing::{debug, warn};

/// Execute the sync command
///
/// Pushes the cache entries the project's lockfile uses (all entries when
/// the project has no readable lockfile) and a fresh snapshot.
pub async fn execute(config: &Config, project: &Path) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);
    let cloud = open_cloud(config).ok_or_else(|| {
        PackratError::User("Cloud cache is not enabled; pass --cloud-cache or set cloud.enabled".to_string())
    })?;

    let store = CacheStore::new(config.cache.root());
    let mut entries = store.list().await?;
    match resolve_packages(project) {
        Ok(resolved) => {
            let wanted: std::collections::HashSet<String> = resolved
                .packages
                .iter()
                .filter_map(|p| p.fingerprint().ok())
                .map(|fp| fp.key())
                .collect();
            entries.retain(|e| wanted.contains(&e.fingerprint.key()));
        }
        Err(e) => debug!("Syncing the whole cache: {}", e),
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Pushing {} packages to {}...", entries.len(), cloud.provider_name()));
    let (mut pushed, mut failed) = (0usize, 0usize);
    for entry in &entries {
        match cloud.push_package(&entry.fingerprint, &entry.storage_path).await {
            Ok(true) => pushed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("{}: {}", entry.fingerprint.spec(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        spinner.stop_warn(&format!("{} pushed, {} failed", pushed, failed));
    } else {
        spinner.stop(&format!("{} pushed, {} already present", pushed, entries.len() - pushed));
    }

    let archiver = SnapshotArchiver::from_config(config);
    match archiver.status(project).await {
        Ok(SnapshotStatus::Fresh(manifest)) => {
            let archive = archiver.archive_path(project);
            match cloud.push_snapshot(&manifest.project_manifest_hash, &archive).await {
                Ok(true) => ui::step_ok(&ctx, &format!("Snapshot {} pushed", manifest.id)),
                Ok(false) => ui::step_info(&ctx, "Snapshot already in the cloud cache"),
                Err(e) => ui::step_warn_hint(&ctx, "Snapshot push failed", &e.to_string()),
            }
        }
        Ok(SnapshotStatus::Stale { .. }) => {
            ui::step_warn_hint(&ctx, "Snapshot is stale, not pushed", "run: packrat snapshot")
        }
        Ok(SnapshotStatus::Missing) | Err(_) => {}
    }

    if failed > 0 {
        ui::outro_warn(&ctx, "Sync finished with errors");
    } else {
        ui::outro_success(&ctx, "Cloud cache up to date");
    }
    Ok(())
}
