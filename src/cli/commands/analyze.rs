//! Analyze command - what an install would do

use crate::cache::{format_bytes, CacheStore};
use crate::cli::args::{AnalyzeArgs, OutputFormat};
use crate::config::Config;
use crate::error::PackratResult;
use crate::installer::{analyze, Analysis};
use crate::ui::{self, UiContext};
use std::path::Path;

/// Execute the analyze command
pub async fn execute(args: AnalyzeArgs, config: &Config, project: &Path) -> PackratResult<()> {
    let store = CacheStore::new(config.cache.root());
    let analysis = analyze(project, config, &store).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
        OutputFormat::Table => print_table(&UiContext::for_config(config), &analysis, project),
    }
    Ok(())
}

fn print_table(ctx: &UiContext, a: &Analysis, project: &Path) {
    ui::section(ctx, &format!("Project {}", project.display()));
    ui::key_value(ctx, "lockfile", &a.lockfile);
    ui::key_value(ctx, "lockfile hash", &a.lockfile_hash[..a.lockfile_hash.len().min(16)]);
    ui::key_value(ctx, "packages", &a.packages.to_string());
    ui::key_value_status(ctx, "cached", &format!("{}/{}", a.cached, a.packages), a.missing == 0);
    ui::key_value_status(ctx, "installed", &format!("{}/{}", a.installed, a.packages), a.installed == a.packages);
    ui::key_value(ctx, "install scripts", &a.with_install_scripts.to_string());

    let snapshot = match &a.snapshot_id {
        Some(id) => format!("{} ({})", a.snapshot, id),
        None => a.snapshot.to_string(),
    };
    ui::key_value_status(ctx, "snapshot", &snapshot, a.snapshot == "fresh");

    ui::section(ctx, "Local cache");
    ui::key_value(ctx, "entries", &a.cache.entries.to_string());
    ui::key_value(ctx, "size", &format_bytes(a.cache.total_bytes));

    if a.missing > 0 {
        ui::remark(ctx, &format!("{} packages would be fetched", a.missing));
    }
}
