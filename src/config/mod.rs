//! Configuration management for Packrat

pub mod schema;

pub use schema::{
    CacheConfig, CloudConfig, CloudCredentials, CloudProviderKind, Config, InstallConfig,
    PackageManager, SyncPolicy, MAX_CONCURRENCY, MIN_CONCURRENCY,
};

use crate::error::{PackratError, PackratResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = ".packrat.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("packrat")
            .join("config.toml")
    }

    /// Walk up from `start` looking for a `.packrat.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> PackratResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PackratResult<Config> {
        let value = read_table(path).await?;
        into_config(value, path)
    }

    /// Load the global config with a project-local file layered on top.
    ///
    /// Tables merge key by key, so a local file only needs the keys it
    /// overrides.
    pub async fn load_merged(&self, local: Option<&Path>) -> PackratResult<Config> {
        let mut merged = if self.config_path.exists() {
            read_table(&self.config_path).await?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let origin = match local {
            Some(local_path) => {
                let overlay = read_table(local_path).await?;
                merge_values(&mut merged, overlay);
                debug!("Merged local config {}", local_path.display());
                local_path.to_path_buf()
            }
            None => self.config_path.clone(),
        };

        into_config(merged, &origin)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PackratResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PackratError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PackratResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PackratError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_table(path: &Path) -> PackratResult<toml::Value> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PackratError::io(format!("reading config from {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| PackratError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn into_config(value: toml::Value, origin: &Path) -> PackratResult<Config> {
    let config: Config = value.try_into().map_err(|e: toml::de::Error| {
        PackratError::ConfigInvalid {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    config.validate().map_err(|reason| PackratError::ConfigInvalid {
        path: origin.to_path_buf(),
        reason,
    })?;
    Ok(config)
}

/// Deep-merge `overlay` into `base`; scalars and arrays in `overlay` win
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.install.concurrency, 4);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.install.concurrency = 8;

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.install.concurrency, 8);
    }

    #[tokio::test]
    async fn local_config_overrides_global_keys() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        std::fs::write(
            &global,
            "[install]\nconcurrency = 2\nrun_scripts = false\n[cloud]\nbucket = \"global\"\n",
        )
        .unwrap();
        let local = temp.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&local, "[install]\nconcurrency = 12\n").unwrap();

        let manager = ConfigManager::with_path(global);
        let config = manager.load_merged(Some(&local)).await.unwrap();

        assert_eq!(config.install.concurrency, 12);
        assert!(!config.install.run_scripts); // untouched global key survives
        assert_eq!(config.cloud.bucket, "global");
    }

    #[tokio::test]
    async fn invalid_concurrency_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[install]\nconcurrency = 40\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, PackratError::ConfigInvalid { .. }));
    }

    #[test]
    fn find_local_config_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), "").unwrap();
        let nested = temp.path().join("packages").join("web");
        std::fs::create_dir_all(&nested).unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(LOCAL_CONFIG_FILE));
    }
}
