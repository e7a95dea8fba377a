//! Packrat - fast, deterministic JavaScript dependency installs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use packrat::cli::{commands, Cli, Commands};
use packrat::config::{Config, ConfigManager};
use packrat::error::{PackratError, PackratResult};
use packrat::ui;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PackratResult<ExitCode> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        commands::completions(args);
        return Ok(ExitCode::SUCCESS);
    }

    let project = match &cli.global.project {
        Some(path) => path.clone(),
        None => std::env::current_dir().map_err(|e| PackratError::io("getting current directory", e))?,
    };

    let manager = match &cli.global.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let local = if cli.global.no_local {
        None
    } else {
        ConfigManager::find_local_config(&project)
    };
    let mut config = manager.load_merged(local.as_deref()).await?;
    cli.global.apply(&mut config);
    config.validate().map_err(|reason| PackratError::ConfigInvalid {
        path: manager.path().to_path_buf(),
        reason,
    })?;

    init_logging(cli.global.verbose, &config);
    if let Some(path) = &local {
        debug!("Merged local config: {}", path.display());
    }
    ui::init_theme();

    let cancel = cancel_flag();

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Install(args) => commands::install(args, &config, &project, cancel).await,
        Commands::Restore(args) => commands::restore(args, &config, &project, cancel).await,
        command => {
            dispatch(command, &config, &manager, &project).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn dispatch(
    command: Commands,
    config: &Config,
    manager: &ConfigManager,
    project: &Path,
) -> PackratResult<()> {
    match command {
        Commands::Snapshot(args) => commands::snapshot(args, config, project).await,
        Commands::Clean(args) => commands::clean(args, config).await,
        Commands::CleanModules => commands::clean_modules(config, project).await,
        Commands::CleanSnapshot => commands::clean_snapshot(config, project).await,
        Commands::Sync => commands::sync(config, project).await,
        Commands::Analyze(args) => commands::analyze(args, config, project).await,
        Commands::Plugin(args) => commands::plugin(args, config).await,
        Commands::Config(args) => commands::config(args, config, manager, project).await,
        Commands::Install(_) | Commands::Restore(_) | Commands::Completions(_) => {
            unreachable!("handled in run")
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("packrat=warn"),
        1 => EnvFilter::new("packrat=info"),
        _ => EnvFilter::new("packrat=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// Flag flipped by Ctrl-C; in-flight packages finish, pending ones never start
fn cancel_flag() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}
