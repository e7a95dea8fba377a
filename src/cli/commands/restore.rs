//! Restore command - unpack the snapshot over the modules dir

use crate::cli::args::{OutputFormat, RestoreArgs};
use crate::cli::commands::install::{exit_code, print_report, run_install};
use crate::cli::commands::{load_hooks, open_cloud, project_context};
use crate::cloud::CloudFetchOutcome;
use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::lockfile::manifest_hash;
use crate::plugin::{HookDispatcher, HookPoint};
use crate::snapshot::SnapshotArchiver;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Execute the restore command
pub async fn execute(
    args: RestoreArgs,
    config: &Config,
    project: &Path,
    cancel: Arc<AtomicBool>,
) -> PackratResult<ExitCode> {
    let ctx = UiContext::for_config(config);
    let hooks = load_hooks(config).await;
    let result = restore(&args, config, project, &hooks, &ctx).await;
    hooks.shutdown().await;

    match result {
        Ok(()) => {
            ui::outro_success(&ctx, "Dependencies restored");
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ (PackratError::SnapshotStale { .. } | PackratError::SnapshotNotFound(_))) if args.fallback => {
            ui::step_warn_hint(&ctx, &e.to_string(), "running a full install instead");
            let report = run_install(config, project, cancel, &ctx).await?;
            print_report(&ctx, &report, OutputFormat::Table)?;
            Ok(exit_code(&report))
        }
        Err(e) => Err(e),
    }
}

async fn restore(
    args: &RestoreArgs,
    config: &Config,
    project: &Path,
    hooks: &HookDispatcher,
    ctx: &UiContext,
) -> PackratResult<()> {
    let hook_ctx = project_context(config, project);
    let pre = hooks.dispatch(HookPoint::PreRestore, &hook_ctx).await?;
    if let Some(plugin) = pre.vetoed_by {
        return Err(PackratError::Vetoed {
            plugin,
            hook: HookPoint::PreRestore.to_string(),
        });
    }

    let archiver = SnapshotArchiver::from_config(config);
    let archive = match &args.from {
        Some(path) => path.clone(),
        None => archiver.archive_path(project),
    };

    if !archive.is_file() && args.from.is_none() {
        pull_from_cloud(config, project, &archive, ctx).await?;
    }
    if !archive.is_file() {
        return Err(PackratError::SnapshotNotFound(archive));
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Restoring snapshot...");
    let manifest = match archiver.restore_from(project, &archive).await {
        Ok(manifest) => manifest,
        Err(e) => {
            spinner.stop_error("Restore failed");
            return Err(e);
        }
    };
    spinner.stop(&format!(
        "Restored {} packages from snapshot {}",
        manifest.entries.len(),
        manifest.id
    ));

    hooks.dispatch(HookPoint::PostRestore, &hook_ctx).await?;
    Ok(())
}

/// Fetch the team's snapshot for the current lockfile, if there is one
async fn pull_from_cloud(config: &Config, project: &Path, archive: &Path, ctx: &UiContext) -> PackratResult<()> {
    let Some(cloud) = open_cloud(config) else {
        return Ok(());
    };
    let hash = manifest_hash(project)?;
    match cloud.fetch_snapshot(&hash, archive).await {
        CloudFetchOutcome::Hit => ui::step_ok(ctx, &format!("Pulled snapshot from {}", cloud.provider_name())),
        CloudFetchOutcome::Miss => ui::step_info(ctx, "No snapshot for this lockfile in the cloud cache"),
        CloudFetchOutcome::Failed(e) => ui::step_warn_hint(ctx, "Cloud snapshot unavailable", &e.to_string()),
    }
    Ok(())
}
