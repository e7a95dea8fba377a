//! Command-backed plugins and the plugin manifest
//!
//! The manifest (`plugins.toml`) declares plugins as tables:
//!
//! ```toml
//! [[plugin]]
//! name = "notify"
//! version = "1.0.0"
//! priority = 10
//! dependencies = ["audit"]
//!
//! [plugin.hooks]
//! postInstall = "notify-send 'deps ready'"
//! ```
//!
//! Each hook command runs under `sh -c` with the hook context as JSON on
//! stdin. Exit 0 continues; exit 0 printing `false` vetoes; anything else is
//! a handler error.

use crate::error::{PackratError, PackratResult};
use crate::plugin::hook::{HookContext, HookOutcome, HookPoint};
use crate::plugin::traits::Plugin;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use toml_edit::{ArrayOfTables, DocumentMut, Item};
use tracing::{debug, info, warn};

/// File a plugin package ships its declaration in
pub const PLUGIN_FILE: &str = "packrat-plugin.toml";

const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 120;

fn default_true() -> bool {
    true
}

/// Declaration of one command plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Where the plugin came from (path or npm package)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Working directory for hook commands; defaults to the project dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub hooks: BTreeMap<HookPoint, String>,
}

impl PluginSpec {
    /// Reject declarations that could never run
    pub fn validate(&self) -> PackratResult<()> {
        let reject = |reason: String| PackratError::PluginLoad {
            name: if self.name.is_empty() {
                "<unnamed>".to_string()
            } else {
                self.name.clone()
            },
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(reject("name is empty".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(reject("version is empty".to_string()));
        }
        if self.hooks.is_empty() {
            return Err(reject("declares no hooks".to_string()));
        }
        if let Some((point, _)) = self.hooks.iter().find(|(_, cmd)| cmd.trim().is_empty()) {
            return Err(reject(format!("hook {} has an empty command", point)));
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(reject("depends on itself".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a standalone `packrat-plugin.toml`
    pub async fn from_file(path: &Path) -> PackratResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PackratError::io(format!("reading {}", path.display()), e))?;
        let spec: PluginSpec = toml::from_str(&content).map_err(|e| PackratError::PluginLoad {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }
}

/// Plugin whose handlers are shell commands
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    spec: PluginSpec,
}

impl CommandPlugin {
    pub fn new(spec: PluginSpec) -> PackratResult<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn priority(&self) -> i32 {
        self.spec.priority
    }

    fn dependencies(&self) -> Vec<String> {
        self.spec.dependencies.clone()
    }

    fn hooks(&self) -> BTreeSet<HookPoint> {
        self.spec.hooks.keys().copied().collect()
    }

    async fn handle(&self, point: HookPoint, ctx: &HookContext) -> PackratResult<HookOutcome> {
        let Some(command) = self.spec.hooks.get(&point) else {
            return Ok(HookOutcome::Continue);
        };
        debug!("Running {} hook for plugin {}: {}", point, self.spec.name, command);

        let payload = serde_json::to_vec(ctx)?;
        let workdir = self.spec.dir.clone().unwrap_or_else(|| ctx.project_dir.clone());

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .env("PACKRAT_HOOK", point.as_str())
            .env("PACKRAT_PLUGIN", &self.spec.name)
            .env("PACKRAT_PROJECT_DIR", &ctx.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| PackratError::command_failed(command.clone(), e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A hook that never reads stdin closes the pipe early; that is fine
            let _ = stdin.write_all(&payload).await;
        }

        let timeout = Duration::from_secs(self.spec.timeout_secs.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS));
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PackratError::command_exec(
                    command.clone(),
                    format!("timed out after {}s", timeout.as_secs()),
                )
            })?
            .map_err(|e| PackratError::command_failed(command.clone(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PackratError::command_exec(command.clone(), stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim() == "false" {
            Ok(HookOutcome::Veto)
        } else {
            Ok(HookOutcome::Continue)
        }
    }
}

/// Result of reading the manifest
#[derive(Debug, Default)]
pub struct ManifestLoad {
    pub specs: Vec<PluginSpec>,
    /// Declarations rejected at load time
    pub rejected: Vec<PackratError>,
}

/// Plugin manifest file (`plugins.toml`)
#[derive(Debug, Clone)]
pub struct PluginManifest {
    path: PathBuf,
}

impl PluginManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every declaration; malformed ones are rejected individually
    pub async fn load(&self) -> PackratResult<ManifestLoad> {
        if !self.path.exists() {
            return Ok(ManifestLoad::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| PackratError::io(format!("reading {}", self.path.display()), e))?;
        let root: toml::Value = toml::from_str(&content).map_err(|e| PackratError::ConfigInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut load = ManifestLoad::default();
        let tables = root
            .get("plugin")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for (idx, table) in tables.into_iter().enumerate() {
            let name = table
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("plugin #{}", idx + 1));

            let parsed: Result<PluginSpec, toml::de::Error> = table.try_into();
            match parsed {
                Ok(spec) => match spec.validate() {
                    Ok(()) => load.specs.push(spec),
                    Err(e) => load.rejected.push(e),
                },
                Err(e) => load.rejected.push(PackratError::PluginLoad {
                    name,
                    reason: e.to_string(),
                }),
            }
        }

        for err in &load.rejected {
            warn!("{}", err);
        }
        Ok(load)
    }

    /// Find one declaration by name
    pub async fn get(&self, name: &str) -> PackratResult<PluginSpec> {
        self.load()
            .await?
            .specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PackratError::PluginNotFound(name.to_string()))
    }

    /// Append a declaration; names must be unique
    pub async fn add(&self, spec: &PluginSpec) -> PackratResult<()> {
        spec.validate()?;
        let mut doc = self.read_document().await?;

        let table_doc: DocumentMut = toml::to_string(spec)?.parse()?;
        let plugins = plugin_tables(&mut doc)?;
        if plugins
            .iter()
            .any(|t| t.get("name").and_then(|v| v.as_str()) == Some(spec.name.as_str()))
        {
            return Err(PackratError::User(format!(
                "Plugin {} is already registered",
                spec.name
            )));
        }
        plugins.push(table_doc.as_table().clone());

        self.write_document(&doc).await?;
        info!("Registered plugin {}", spec.name);
        Ok(())
    }

    /// Remove a declaration
    pub async fn remove(&self, name: &str) -> PackratResult<()> {
        let mut doc = self.read_document().await?;
        let plugins = plugin_tables(&mut doc)?;
        let idx = plugins
            .iter()
            .position(|t| t.get("name").and_then(|v| v.as_str()) == Some(name))
            .ok_or_else(|| PackratError::PluginNotFound(name.to_string()))?;
        plugins.remove(idx);

        self.write_document(&doc).await?;
        info!("Removed plugin {}", name);
        Ok(())
    }

    /// Flip the `enabled` flag, keeping the rest of the file untouched
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> PackratResult<()> {
        let mut doc = self.read_document().await?;
        let plugins = plugin_tables(&mut doc)?;
        let table = plugins
            .iter_mut()
            .find(|t| t.get("name").and_then(|v| v.as_str()) == Some(name))
            .ok_or_else(|| PackratError::PluginNotFound(name.to_string()))?;
        table["enabled"] = toml_edit::value(enabled);

        self.write_document(&doc).await?;
        info!("{} plugin {}", if enabled { "Enabled" } else { "Disabled" }, name);
        Ok(())
    }

    async fn read_document(&self) -> PackratResult<DocumentMut> {
        if !self.path.exists() {
            return Ok(DocumentMut::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| PackratError::io(format!("reading {}", self.path.display()), e))?;
        Ok(content.parse()?)
    }

    async fn write_document(&self, doc: &DocumentMut) -> PackratResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PackratError::io(format!("creating {}", parent.display()), e))?;
        }
        let tmp = self.path.with_extension(format!("toml.tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, doc.to_string())
            .await
            .map_err(|e| PackratError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PackratError::io(format!("replacing {}", self.path.display()), e))
    }
}

fn plugin_tables(doc: &mut DocumentMut) -> PackratResult<&mut ArrayOfTables> {
    doc.entry("plugin")
        .or_insert(Item::ArrayOfTables(ArrayOfTables::new()))
        .as_array_of_tables_mut()
        .ok_or_else(|| PackratError::User("'plugin' in the manifest must be [[plugin]] tables".to_string()))
}
