//! Snapshot command - archive the installed tree

use crate::cache::format_bytes;
use crate::cli::args::SnapshotArgs;
use crate::cli::commands::{load_hooks, open_cloud, project_context};
use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::lockfile::resolve_packages;
use crate::plugin::{HookDispatcher, HookPoint};
use crate::snapshot::SnapshotArchiver;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;

/// Execute the snapshot command
pub async fn execute(args: SnapshotArgs, config: &Config, project: &Path) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);
    let hooks = load_hooks(config).await;
    let result = create(&args, config, project, &hooks, &ctx).await;
    hooks.shutdown().await;
    result
}

async fn create(
    args: &SnapshotArgs,
    config: &Config,
    project: &Path,
    hooks: &HookDispatcher,
    ctx: &UiContext,
) -> PackratResult<()> {
    let hook_ctx = project_context(config, project);
    let pre = hooks.dispatch(HookPoint::PreSnapshot, &hook_ctx).await?;
    if let Some(plugin) = pre.vetoed_by {
        return Err(PackratError::Vetoed {
            plugin,
            hook: HookPoint::PreSnapshot.to_string(),
        });
    }

    let resolved = resolve_packages(project)?;
    let archiver = SnapshotArchiver::from_config(config);

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Archiving {} packages...", resolved.packages.len()));
    let snapshot = match archiver.create(project, &resolved).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            spinner.stop_error("Snapshot failed");
            if let PackratError::SnapshotDrift(drifted) = &e {
                for spec in drifted {
                    ui::step_error(ctx, spec);
                }
            }
            return Err(e);
        }
    };
    spinner.stop(&format!(
        "Snapshot {} written ({})",
        snapshot.id,
        format_bytes(snapshot.size_bytes)
    ));

    hooks.dispatch(HookPoint::PostSnapshot, &hook_ctx).await?;

    if args.push {
        match open_cloud(config) {
            Some(cloud) => {
                match cloud
                    .push_snapshot(&snapshot.project_manifest_hash, &snapshot.archive_path)
                    .await
                {
                    Ok(true) => ui::step_ok(ctx, &format!("Pushed to {}", cloud.provider_name())),
                    Ok(false) => ui::step_info(ctx, "Snapshot already in the cloud cache"),
                    Err(e) => ui::step_warn_hint(ctx, "Cloud push failed", &e.to_string()),
                }
            }
            None => ui::step_warn_hint(ctx, "Cloud cache is not enabled", "pass --cloud-cache or set cloud.enabled"),
        }
    }

    ui::key_value(ctx, "archive", &snapshot.archive_path.display().to_string());
    Ok(())
}
