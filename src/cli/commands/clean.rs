//! Clean commands - cache entries, installed tree and snapshot

use crate::cache::{format_bytes, CacheStore};
use crate::cli::args::CleanArgs;
use crate::config::Config;
use crate::error::PackratResult;
use crate::installer;
use crate::snapshot::SnapshotArchiver;
use crate::ui::{self, UiContext};
use std::path::Path;

/// Execute the clean command
pub async fn execute(args: CleanArgs, config: &Config) -> PackratResult<()> {
    let ctx = UiContext::for_config(config).with_auto_yes(args.yes);
    let store = CacheStore::new(config.cache.root());

    let summary = match args.older_than_days {
        Some(days) => store.prune(chrono::Duration::days(i64::from(days))).await?,
        None => {
            let stats = store.stats().await?;
            if stats.entries == 0 {
                ui::step_info(&ctx, "Cache is already empty");
                return Ok(());
            }
            let question = format!(
                "Remove all {} cache entries ({}) from {}?",
                stats.entries,
                format_bytes(stats.total_bytes),
                store.root().display()
            );
            if !ui::confirm(&ctx, &question, false).await? {
                ui::step_warn_hint(&ctx, "Nothing removed", "pass --yes to skip the prompt");
                return Ok(());
            }
            store.clear().await?
        }
    };

    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} cache entries", summary.removed),
        &format!("{} freed", format_bytes(summary.freed_bytes)),
    );
    Ok(())
}

/// Execute the clean-modules command
pub async fn clean_modules(config: &Config, project: &Path) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);
    if installer::clean_modules(project, config).await? {
        ui::step_ok(&ctx, &format!("Removed {}", config.install.modules_dir));
    } else {
        ui::step_info(&ctx, &format!("No {} to remove", config.install.modules_dir));
    }
    Ok(())
}

/// Execute the clean-snapshot command
pub async fn clean_snapshot(config: &Config, project: &Path) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);
    if SnapshotArchiver::from_config(config).delete(project).await? {
        ui::step_ok(&ctx, "Snapshot removed");
    } else {
        ui::step_info(&ctx, "No snapshot to remove");
    }
    Ok(())
}
