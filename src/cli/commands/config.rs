//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::error::{PackratError, PackratResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Str,
}

/// Keys `config set` accepts, with the TOML type they are written as
const KEYS: &[(&str, Kind)] = &[
    ("general.log_format", Kind::Str),
    ("general.interactive", Kind::Bool),
    ("install.concurrency", Kind::Int),
    ("install.package_manager", Kind::Str),
    ("install.fallback_to_npm", Kind::Bool),
    ("install.run_scripts", Kind::Bool),
    ("install.registry", Kind::Str),
    ("install.fetch_timeout_secs", Kind::Int),
    ("install.modules_dir", Kind::Str),
    ("cache.enabled", Kind::Bool),
    ("cache.dir", Kind::Str),
    ("cache.max_age_days", Kind::Int),
    ("cloud.enabled", Kind::Bool),
    ("cloud.provider", Kind::Str),
    ("cloud.bucket", Kind::Str),
    ("cloud.region", Kind::Str),
    ("cloud.prefix", Kind::Str),
    ("cloud.team_id", Kind::Str),
    ("cloud.sync_policy", Kind::Str),
    ("cloud.upload", Kind::Bool),
    ("cloud.timeout_secs", Kind::Int),
    ("snapshot.file_name", Kind::Str),
    ("snapshot.compression_level", Kind::Int),
    ("plugins.manifest", Kind::Str),
    ("plugins.dir", Kind::Str),
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager, project: &Path) -> PackratResult<()> {
    let ctx = UiContext::for_config(config);

    match args.action {
        None | Some(ConfigAction::Show) => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(&ctx, manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            let path = if local {
                project.join(LOCAL_CONFIG_FILE)
            } else {
                manager.path().to_path_buf()
            };
            set_value(&path, &key, &value).await?;
            ui::step_ok(&ctx, &format!("Set {} = {} in {}", key, value, path.display()));
        }
    }
    Ok(())
}

async fn init_config(ctx: &UiContext, manager: &ConfigManager, force: bool) -> PackratResult<()> {
    let path = manager.path();
    if path.exists() && !force {
        ui::step_warn_hint(
            ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

/// Write one key into a config file, keeping the keys already there
///
/// The result must still deserialize and validate as a `Config`.
async fn set_value(path: &Path, key: &str, value: &str) -> PackratResult<()> {
    let kind = KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| {
            let valid: Vec<&str> = KEYS.iter().map(|(k, _)| *k).collect();
            PackratError::User(format!("Unknown config key: {} (valid: {})", key, valid.join(", ")))
        })?;

    let mut doc: toml::Value = if path.exists() {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PackratError::io(format!("reading {}", path.display()), e))?;
        toml::from_str(&content).map_err(|e| PackratError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    set_toml_value(&mut doc, key, parse_value(kind, value)?)?;

    let candidate: Config = doc.clone().try_into().map_err(|e: toml::de::Error| PackratError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    candidate.validate().map_err(|reason| PackratError::ConfigInvalid {
        path: path.to_path_buf(),
        reason,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PackratError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    fs::write(path, toml::to_string_pretty(&doc)?)
        .await
        .map_err(|e| PackratError::io(format!("writing {}", path.display()), e))
}

fn parse_value(kind: Kind, value: &str) -> PackratResult<toml::Value> {
    match kind {
        Kind::Bool => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(toml::Value::Boolean(true)),
            "false" | "0" | "no" => Ok(toml::Value::Boolean(false)),
            _ => Err(PackratError::User(format!(
                "Invalid boolean value: {}. Use true/false",
                value
            ))),
        },
        Kind::Int => value
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| PackratError::User(format!("Invalid number: {}", value))),
        Kind::Str => Ok(toml::Value::String(value.to_string())),
    }
}

/// Set a dotted key in a TOML tree, creating intermediate tables
fn set_toml_value(doc: &mut toml::Value, key: &str, value: toml::Value) -> PackratResult<()> {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (parents.split('.').collect::<Vec<_>>(), leaf),
        None => (Vec::new(), key),
    };

    let mut current = doc;
    for part in parents {
        current = current
            .as_table_mut()
            .ok_or_else(|| PackratError::User(format!("Expected table at key: {}", part)))?
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    current
        .as_table_mut()
        .ok_or_else(|| PackratError::User(format!("Expected table for key: {}", key)))?
        .insert(leaf.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_keeps_existing_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&path, "[install]\nrun_scripts = false\n").unwrap();

        set_value(&path, "install.concurrency", "8").await.unwrap();
        set_value(&path, "cloud.bucket", "1234").await.unwrap();

        let config: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.install.concurrency, 8);
        assert!(!config.install.run_scripts);
        assert_eq!(config.cloud.bucket, "1234");
    }

    #[tokio::test]
    async fn set_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        assert!(set_value(&path, "install.concurrency", "64").await.is_err());
        assert!(set_value(&path, "install.package_manager", "pip").await.is_err());
        assert!(set_value(&path, "vm.name", "x").await.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn set_toml_value_creates_tables() {
        let mut doc = toml::Value::Table(toml::map::Map::new());
        set_toml_value(&mut doc, "cloud.team_id", toml::Value::String("web".into())).unwrap();
        assert_eq!(doc["cloud"]["team_id"].as_str(), Some("web"));
    }
}
