//! Configuration schema for Packrat
//!
//! Global configuration lives at `~/.config/packrat/config.toml`; a project
//! may override any key in a `.packrat.toml` next to its lockfile.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lowest accepted worker pool size
pub const MIN_CONCURRENCY: usize = 1;
/// Highest accepted worker pool size
pub const MAX_CONCURRENCY: usize = 16;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Installer settings
    pub install: InstallConfig,

    /// Local cache store settings
    pub cache: CacheConfig,

    /// Team cloud cache settings
    pub cloud: CloudConfig,

    /// Snapshot archive settings
    pub snapshot: SnapshotConfig,

    /// Plugin manifest settings
    pub plugins: PluginsConfig,
}

impl Config {
    /// Reject values the installer cannot run with
    pub fn validate(&self) -> Result<(), String> {
        let c = self.install.concurrency;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&c) {
            return Err(format!(
                "install.concurrency must be between {} and {}, got {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY, c
            ));
        }
        if self.cloud.enabled && self.cloud.bucket.trim().is_empty() {
            return Err("cloud.bucket is required when cloud.enabled = true".to_string());
        }
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                self.general.log_format
            ));
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Allow spinners and prompts when attached to a terminal
    pub interactive: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            interactive: true,
        }
    }
}

/// Package manager used for fallback installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    /// Program and arguments for a full install
    pub fn install_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Npm => ("npm", &["install", "--no-audit", "--no-fund"]),
            Self::Yarn => ("yarn", &["install"]),
            Self::Pnpm => ("pnpm", &["install"]),
            Self::Bun => ("bun", &["install"]),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Bun => "bun",
        };
        write!(f, "{}", name)
    }
}

/// Installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Worker pool size (1-16)
    pub concurrency: usize,

    /// Package manager to delegate to on fatal errors
    pub package_manager: PackageManager,

    /// Delegate to the package manager when the run cannot continue
    pub fallback_to_npm: bool,

    /// Run preinstall/install/postinstall scripts after extraction
    pub run_scripts: bool,

    /// Registry base URL
    pub registry: String,

    /// Per-request timeout for registry downloads
    pub fetch_timeout_secs: u64,

    /// Name of the installed dependency tree directory
    pub modules_dir: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            package_manager: PackageManager::Npm,
            fallback_to_npm: true,
            run_scripts: true,
            registry: "https://registry.npmjs.org".to_string(),
            fetch_timeout_secs: 60,
            modules_dir: "node_modules".to_string(),
        }
    }
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Consult the cache before downloading (default: true)
    pub enabled: bool,

    /// Store root; defaults to the platform cache dir
    pub dir: Option<PathBuf>,

    /// Prune entries not accessed for N days after install (0 = never)
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_age_days: 0,
        }
    }
}

impl CacheConfig {
    /// Resolved store root
    pub fn root(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("packrat")
                .join("store")
        })
    }
}

/// Supported object store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CloudProviderKind {
    #[default]
    S3,
    Azure,
    Gcp,
}

impl fmt::Display for CloudProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S3 => "s3",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        };
        write!(f, "{}", name)
    }
}

/// When local entries are pushed to the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPolicy {
    /// Push every new or changed entry regardless of remote state
    AlwaysUpload,
    /// Push only when the remote object is absent
    #[default]
    UploadIfMissing,
}

/// Credentials handed to the provider CLI as environment variables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudCredentials {
    /// AWS named profile
    pub profile: Option<String>,

    /// AWS access key
    pub access_key_id: Option<String>,

    /// AWS secret key
    pub secret_access_key: Option<String>,

    /// Azure storage account
    pub account_name: Option<String>,

    /// Azure storage key
    pub account_key: Option<String>,

    /// GCP project
    pub project: Option<String>,
}

/// Team cloud cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Consult and populate the cloud cache
    pub enabled: bool,

    /// Backend type
    pub provider: CloudProviderKind,

    /// Bucket (S3/GCS) or container (Azure)
    pub bucket: String,

    /// Region, where the provider needs one
    pub region: Option<String>,

    /// Project prefix inside the bucket
    pub prefix: Option<String>,

    /// Team partition inside the bucket
    pub team_id: Option<String>,

    /// Upload policy
    pub sync_policy: SyncPolicy,

    /// Push new entries after download (read-only cache when false)
    pub upload: bool,

    /// Optional explicit credentials
    pub credentials: Option<CloudCredentials>,

    /// Per-operation timeout
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: CloudProviderKind::S3,
            bucket: String::new(),
            region: None,
            prefix: None,
            team_id: None,
            sync_policy: SyncPolicy::UploadIfMissing,
            upload: true,
            credentials: None,
            timeout_secs: 30,
        }
    }
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Archive name at the project root
    pub file_name: String,

    /// zstd level
    pub compression_level: i32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            file_name: ".packrat-snapshot.tar.zst".to_string(),
            compression_level: 3,
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin manifest path; defaults to the config dir
    pub manifest: Option<PathBuf>,

    /// Where `plugin install` unpacks plugins
    pub dir: Option<PathBuf>,
}

impl PluginsConfig {
    /// Resolved manifest path
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("packrat")
                .join("plugins.toml")
        })
    }

    /// Resolved install directory
    pub fn install_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("packrat")
                .join("plugins")
        })
    }
}
