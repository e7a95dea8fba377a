//! Plugin command - manage the plugin manifest

use crate::cli::args::{PluginAction, PluginArgs};
use crate::config::Config;
use crate::error::{PackratError, PackratResult};
use crate::plugin::{PluginManifest, PluginRegistry, PluginSpec, PLUGIN_FILE};
use crate::registry::{extract_tarball, plugin_tarball_path, NpmRegistry};
use crate::ui::{self, TaskSpinner, UiContext};
use console::style;
use std::path::{Path, PathBuf};

/// npm keyword plugin packages publish under
pub const PLUGIN_KEYWORD: &str = "packrat-plugin";

/// Execute the plugin command
pub async fn execute(args: PluginArgs, config: &Config) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);
    let manifest = PluginManifest::new(config.plugins.manifest_path());

    match args.action {
        PluginAction::List => list(&ctx, &manifest).await,
        PluginAction::Add { path } => add(&ctx, &manifest, &path).await,
        PluginAction::Remove { name } => {
            manifest.remove(&name).await?;
            ui::step_ok(&ctx, &format!("Removed plugin {}", name));
            Ok(())
        }
        PluginAction::Enable { name } => {
            manifest.set_enabled(&name, true).await?;
            ui::step_ok(&ctx, &format!("Enabled plugin {}", name));
            Ok(())
        }
        PluginAction::Disable { name } => {
            manifest.set_enabled(&name, false).await?;
            ui::step_ok(&ctx, &format!("Disabled plugin {}", name));
            Ok(())
        }
        PluginAction::Install { package } => install(&ctx, config, &manifest, &package).await,
        PluginAction::Search { term } => search(config, &term).await,
        PluginAction::Info { name } => info(&ctx, &manifest, &name).await,
    }
}

/// Manifest contents with the state each plugin would have in a run
async fn list(ctx: &UiContext, manifest: &PluginManifest) -> PackratResult<()> {
    let mut registry = PluginRegistry::from_manifest(manifest).await?;
    registry.load().await;

    if registry.registrations().is_empty() && registry.diagnostics().is_empty() {
        println!("No plugins registered in {}", manifest.path().display());
        return Ok(());
    }

    println!("{:<24} {:<10} {:<9} {:<10} HOOKS", "NAME", "VERSION", "PRIORITY", "STATE");
    println!("{}", "-".repeat(80));
    for reg in registry.registrations() {
        let state = if reg.is_enabled() {
            style("enabled").green().to_string()
        } else {
            style("disabled").yellow().to_string()
        };
        let hooks: Vec<&str> = reg.hooks().iter().map(|h| h.as_str()).collect();
        println!(
            "{:<24} {:<10} {:<9} {:<10} {}",
            reg.name(),
            reg.version(),
            reg.priority(),
            state,
            hooks.join(",")
        );
        if let Some(reason) = reg.disabled_reason() {
            ui::remark(ctx, &format!("{}: {}", reg.name(), reason));
        }
    }
    for diagnostic in registry.diagnostics() {
        ui::step_warn(ctx, &diagnostic.to_string());
    }
    Ok(())
}

async fn add(ctx: &UiContext, manifest: &PluginManifest, path: &Path) -> PackratResult<()> {
    let file = if path.is_dir() {
        path.join(PLUGIN_FILE)
    } else {
        path.to_path_buf()
    };
    let mut spec = PluginSpec::from_file(&file).await?;
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
    spec.source.get_or_insert_with(|| dir.display().to_string());
    spec.dir.get_or_insert(dir);

    manifest.add(&spec).await?;
    ui::step_ok_detail(ctx, &format!("Registered plugin {}", spec.name), &spec.version);
    Ok(())
}

/// Download the latest published version, unpack it and register it
async fn install(ctx: &UiContext, config: &Config, manifest: &PluginManifest, package: &str) -> PackratResult<()> {
    let registry = NpmRegistry::from_config(&config.install);
    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Fetching {}...", package));

    let published = match registry.latest(package).await {
        Ok(p) => p,
        Err(e) => {
            spinner.stop_error(&format!("{} not found", package));
            return Err(e);
        }
    };

    let plugins_dir = config.plugins.install_dir();
    tokio::fs::create_dir_all(&plugins_dir)
        .await
        .map_err(|e| PackratError::io(format!("creating {}", plugins_dir.display()), e))?;
    let tarball = plugin_tarball_path(&plugins_dir, &published.name, &published.version);
    if let Err(e) = registry
        .download(&published.tarball, published.integrity.as_deref(), &tarball)
        .await
    {
        spinner.stop_error("Download failed");
        return Err(e);
    }

    let target = plugins_dir.join(published.name.replace('/', "__"));
    let (archive, dest) = (tarball.clone(), target.clone());
    let extracted = tokio::task::spawn_blocking(move || extract_tarball(&archive, &dest))
        .await
        .map_err(|e| PackratError::Internal(format!("extract task failed: {}", e)));
    let _ = tokio::fs::remove_file(&tarball).await;
    extracted??;

    let mut spec = match PluginSpec::from_file(&target.join(PLUGIN_FILE)).await {
        Ok(spec) => spec,
        Err(e) => {
            spinner.stop_error(&format!("{} is not a packrat plugin", package));
            return Err(e);
        }
    };
    spec.source = Some(format!("npm:{}@{}", published.name, published.version));
    spec.dir = Some(target);

    manifest.add(&spec).await?;
    spinner.stop(&format!("Installed plugin {} {}", spec.name, spec.version));
    Ok(())
}

async fn search(config: &Config, term: &str) -> PackratResult<()> {
    let registry = NpmRegistry::from_config(&config.install);
    let hits = registry.search(term, PLUGIN_KEYWORD).await?;

    if hits.is_empty() {
        println!("No plugins match '{}'", term);
        return Ok(());
    }
    for hit in hits {
        println!(
            "{} {}  {}",
            style(&hit.name).bold(),
            style(&hit.version).dim(),
            hit.description.unwrap_or_default()
        );
    }
    Ok(())
}

async fn info(ctx: &UiContext, manifest: &PluginManifest, name: &str) -> PackratResult<()> {
    let spec = manifest.get(name).await?;

    ui::section(ctx, &format!("{} {}", spec.name, spec.version));
    if let Some(description) = &spec.description {
        ui::remark(ctx, description);
    }
    ui::key_value_status(ctx, "enabled", &spec.enabled.to_string(), spec.enabled);
    ui::key_value(ctx, "priority", &spec.priority.to_string());
    if !spec.dependencies.is_empty() {
        ui::key_value(ctx, "depends on", &spec.dependencies.join(", "));
    }
    if let Some(source) = &spec.source {
        ui::key_value(ctx, "source", source);
    }
    for (point, command) in &spec.hooks {
        ui::key_value(ctx, point.as_str(), command);
    }
    Ok(())
}
