//! Install command - materialize the lockfile into the modules dir

use crate::cache::CacheStore;
use crate::cli::args::{InstallArgs, OutputFormat};
use crate::cli::commands::{load_hooks, open_cloud};
use crate::config::Config;
use crate::error::PackratResult;
use crate::installer::{InstallOutcome, InstallReport, Installer};
use crate::registry::NpmRegistry;
use crate::ui::{self, UiContext};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Execute the install command
pub async fn execute(
    args: InstallArgs,
    config: &Config,
    project: &Path,
    cancel: Arc<AtomicBool>,
) -> PackratResult<ExitCode> {
    let mut config = config.clone();
    if args.no_fallback {
        config.install.fallback_to_npm = false;
    }
    if args.ignore_scripts {
        config.install.run_scripts = false;
    }

    let ctx = UiContext::for_config(&config);
    if matches!(args.format, OutputFormat::Table) {
        ui::intro(&ctx, "packrat install");
    }

    let report = run_install(&config, project, cancel, &ctx).await?;
    print_report(&ctx, &report, args.format)?;
    Ok(exit_code(&report))
}

/// One full install with the configured cache, cloud, registry and plugins
pub(crate) async fn run_install(
    config: &Config,
    project: &Path,
    cancel: Arc<AtomicBool>,
    ctx: &UiContext,
) -> PackratResult<InstallReport> {
    let store = CacheStore::new(config.cache.root());
    let fetcher = Arc::new(NpmRegistry::from_config(&config.install));
    let hooks = load_hooks(config).await;

    let mut installer = Installer::new(project, config.clone(), store, fetcher)
        .with_hooks(hooks.clone())
        .with_cancel(cancel);
    if let Some(cloud) = open_cloud(config) {
        installer = installer.with_cloud(cloud);
    }
    if let Some(bar) = ui::install_bar(ctx) {
        installer = installer.with_progress(bar);
    }

    let result = installer.install().await;
    hooks.shutdown().await;
    result
}

pub(crate) fn exit_code(report: &InstallReport) -> ExitCode {
    ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
}

pub(crate) fn print_report(ctx: &UiContext, report: &InstallReport, format: OutputFormat) -> PackratResult<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for spec in &report.skipped {
        ui::step_info(ctx, &format!("{} skipped by a plugin", spec));
    }
    for failed in &report.failed {
        ui::step_error_detail(ctx, &failed.spec, &failed.error);
    }

    let elapsed = format!("{:.1}s", report.duration.as_secs_f64());
    match &report.outcome {
        InstallOutcome::Completed => {
            ui::step_ok_detail(
                ctx,
                &format!("Installed {} packages", report.installed.len()),
                &format!(
                    "{} cached, {} from cloud, {} downloaded, {} scripts, {}",
                    report.cache_hits,
                    report.cloud_hits,
                    report.network_downloads,
                    report.scripts_run,
                    elapsed
                ),
            );
            if report.is_success() {
                ui::outro_success(ctx, "Dependencies installed");
            } else {
                ui::outro_error(ctx, &format!("{} packages failed", report.failed.len()));
            }
        }
        InstallOutcome::Cancelled => {
            ui::step_warn(ctx, &format!("{} packages not started", report.pending.len()));
            ui::outro_warn(ctx, "Install cancelled; run it again to resume from the cache");
        }
        InstallOutcome::FellBack { reason, succeeded } => {
            ui::step_warn_hint(ctx, "Fell back to the package manager", reason);
            if *succeeded {
                ui::outro_success(ctx, &format!("Package manager install finished in {}", elapsed));
            } else {
                ui::outro_error(ctx, "Package manager install failed");
            }
        }
    }
    Ok(())
}
