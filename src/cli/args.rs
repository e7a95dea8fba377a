//! CLI argument definitions using clap derive

use crate::config::{CloudProviderKind, Config, PackageManager};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Packrat - fast, deterministic JavaScript dependency installs
///
/// Serves packages from a content-addressed local cache, an optional team
/// cloud cache and whole-tree snapshots, falling back to the package
/// manager when it cannot continue.
#[derive(Parser, Debug)]
#[command(name = "packrat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Flags accepted by every subcommand
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PACKRAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .packrat.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,

    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    pub project: Option<PathBuf>,

    /// Parallel package installs (1-16)
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Skip the local cache lookup (packages are still stored)
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Enable the team cloud cache
    #[arg(long, global = true)]
    pub cloud_cache: bool,

    /// Cloud cache backend
    #[arg(long, global = true)]
    pub cloud_provider: Option<CloudProviderKind>,

    /// Cloud bucket or container
    #[arg(long, global = true)]
    pub cloud_bucket: Option<String>,

    /// Cloud region
    #[arg(long, global = true)]
    pub cloud_region: Option<String>,

    /// Team partition inside the bucket
    #[arg(long, global = true)]
    pub team_id: Option<String>,

    /// Package manager used for fallback installs
    #[arg(long, global = true)]
    pub package_manager: Option<PackageManager>,

    /// Plain output even in a terminal
    #[arg(long, global = true)]
    pub no_interactive: bool,
}

impl GlobalArgs {
    /// Layer command-line flags over the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(n) = self.concurrency {
            config.install.concurrency = usize::from(n);
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.cloud_cache {
            config.cloud.enabled = true;
        }
        if let Some(provider) = self.cloud_provider {
            config.cloud.provider = provider;
        }
        if let Some(bucket) = &self.cloud_bucket {
            config.cloud.bucket = bucket.clone();
        }
        if let Some(region) = &self.cloud_region {
            config.cloud.region = Some(region.clone());
        }
        if let Some(team) = &self.team_id {
            config.cloud.team_id = Some(team.clone());
        }
        if let Some(pm) = self.package_manager {
            config.install.package_manager = pm;
        }
        if self.no_interactive {
            config.general.interactive = false;
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install dependencies from the lockfile
    Install(InstallArgs),

    /// Archive the installed tree into a snapshot
    Snapshot(SnapshotArgs),

    /// Restore the installed tree from the snapshot
    Restore(RestoreArgs),

    /// Remove cache entries
    Clean(CleanArgs),

    /// Remove the project's installed tree
    CleanModules,

    /// Remove the project's snapshot
    CleanSnapshot,

    /// Push local cache entries and the snapshot to the cloud cache
    Sync,

    /// Show what an install would do
    Analyze(AnalyzeArgs),

    /// Manage lifecycle plugins
    Plugin(PluginArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Print shell completions
    Completions(CompletionsArgs),
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Never delegate to the package manager on fatal errors
    #[arg(long)]
    pub no_fallback: bool,

    /// Skip preinstall/install/postinstall scripts
    #[arg(long)]
    pub ignore_scripts: bool,

    /// Report format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the snapshot command
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Also push the snapshot to the cloud cache
    #[arg(long)]
    pub push: bool,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Run a normal install when the snapshot is stale or missing
    #[arg(long)]
    pub fallback: bool,

    /// Restore from this archive instead of the project's snapshot
    #[arg(long)]
    pub from: Option<PathBuf>,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Only remove entries not used for N days
    #[arg(long)]
    pub older_than_days: Option<u32>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the plugin command
#[derive(Parser, Debug)]
pub struct PluginArgs {
    #[command(subcommand)]
    pub action: PluginAction,
}

/// Plugin subcommands
#[derive(Subcommand, Debug)]
pub enum PluginAction {
    /// List plugins in the manifest
    List,

    /// Register a local plugin from its packrat-plugin.toml
    Add {
        /// Path to packrat-plugin.toml (or its directory)
        path: PathBuf,
    },

    /// Remove a plugin from the manifest
    Remove {
        name: String,
    },

    /// Enable a plugin
    Enable {
        name: String,
    },

    /// Disable a plugin without removing it
    Disable {
        name: String,
    },

    /// Download a plugin from the npm registry and register it
    Install {
        /// npm package name
        package: String,
    },

    /// Search the npm registry for plugins
    Search {
        term: String,
    },

    /// Show one plugin's details
    Info {
        name: String,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., install.concurrency)
        key: String,
        /// Value to set
        value: String,
        /// Write to the project-local .packrat.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
