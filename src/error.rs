//! Error types for Packrat
//!
//! All modules use `PackratResult<T>` as their return type.
//!
//! Per-package errors (`InvalidPackageSpec`, `CacheCorruption`, registry and
//! cloud failures) are isolated by the installer and aggregated into the
//! install report. Only `OrchestratorFatal` and gating `PluginHook` errors
//! terminate a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Packrat operations
pub type PackratResult<T> = Result<T, PackratError>;

/// All errors that can occur in Packrat
#[derive(Error, Debug)]
pub enum PackratError {
    // Fingerprint errors
    #[error("Invalid package spec {name}@{version}: {reason}")]
    InvalidPackageSpec {
        name: String,
        version: String,
        reason: String,
    },

    #[error("Invalid integrity string '{0}'")]
    InvalidIntegrity(String),

    #[error("Integrity mismatch for {name}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    // Cache errors
    #[error("Cache entry not found: {0}")]
    CacheEntryNotFound(String),

    #[error("Cache entry {key} is corrupt: {reason}")]
    CacheCorruption { key: String, reason: String },

    // Snapshot errors
    #[error("Snapshot is stale: lockfile hash {current} does not match snapshot {expected}")]
    SnapshotStale { expected: String, current: String },

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    #[error("Installed tree drifted from lockfile: {}", .0.join(", "))]
    SnapshotDrift(Vec<String>),

    #[error("Invalid snapshot archive {path}: {reason}")]
    SnapshotInvalid { path: PathBuf, reason: String },

    // Cloud errors
    #[error("Cloud authentication failed ({provider}): {reason}")]
    CloudAuth { provider: String, reason: String },

    #[error("Cloud storage unavailable ({provider}): {reason}")]
    CloudUnavailable { provider: String, reason: String },

    #[error("Cloud object not found: {0}")]
    CloudObjectNotFound(String),

    // Plugin errors
    #[error("Failed to load plugin {name}: {reason}")]
    PluginLoad { name: String, reason: String },

    #[error("Plugin {plugin} failed on {hook}: {reason}")]
    PluginHook {
        plugin: String,
        hook: String,
        reason: String,
        gating: bool,
    },

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    // Lockfile / resolution errors
    #[error("No lockfile found in {0}")]
    LockfileNotFound(PathBuf),

    #[error("Unsupported lockfile {0}: only package-lock.json and npm-shrinkwrap.json can be read directly")]
    UnsupportedLockfile(PathBuf),

    #[error("Failed to resolve dependencies: {0}")]
    Resolution(String),

    // Registry errors
    #[error("Registry request failed for {url}: {reason}")]
    Registry { url: String, reason: String },

    #[error("Failed to extract {path}: {reason}")]
    Extract { path: PathBuf, reason: String },

    #[error("Lifecycle script '{script}' failed for {package} (exit code {code})")]
    LifecycleScript {
        package: String,
        script: String,
        code: i32,
    },

    // Orchestrator errors
    #[error("Install aborted: {0}")]
    OrchestratorFatal(String),

    #[error("Operation cancelled by plugin {plugin} at {hook}")]
    Vetoed { plugin: String, hook: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PackratError {
    /// Create an IO error with context.
    ///
    /// A full disk is promoted to `OrchestratorFatal`: no per-package retry
    /// can succeed once the device is exhausted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        if is_disk_full(&source) {
            return Self::OrchestratorFatal(format!("disk full while {}", context));
        }
        Self::Io { context, source }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Errors that terminate the whole run rather than one package
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OrchestratorFatal(_) | Self::PluginHook { gating: true, .. }
        )
    }

    /// Cloud failures degrade to a cache miss instead of failing the install
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::CloudAuth { .. } | Self::CloudUnavailable { .. } | Self::CloudObjectNotFound(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SnapshotStale { .. } => {
                Some("The lockfile changed since the snapshot was taken. Run: packrat install && packrat snapshot")
            }
            Self::SnapshotNotFound(_) => Some("Create one with: packrat snapshot"),
            Self::SnapshotDrift(_) => Some("Reinstall to repair the tree: packrat install"),
            Self::UnsupportedLockfile(_) => Some("Run with --package-manager to let it install directly"),
            Self::LockfileNotFound(_) => Some("Generate one with: npm install --package-lock-only"),
            Self::CloudAuth { .. } => Some("Check the credentials of the cloud CLI (aws, az or gcloud)"),
            Self::OrchestratorFatal(_) => Some("Set install.fallback_to_npm = true to fall back automatically"),
            _ => None,
        }
    }
}

/// Whether an IO error means the device ran out of space
pub fn is_disk_full(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PackratError::SnapshotStale {
            expected: "abc".to_string(),
            current: "def".to_string(),
        };
        assert!(err.to_string().contains("Snapshot is stale"));
    }

    #[test]
    fn error_hint() {
        let err = PackratError::SnapshotNotFound(PathBuf::from("/p/.packrat-snapshot.tar.zst"));
        assert_eq!(err.hint(), Some("Create one with: packrat snapshot"));
    }

    #[test]
    fn fatal_classification() {
        assert!(PackratError::OrchestratorFatal("x".into()).is_fatal());
        let gating = PackratError::PluginHook {
            plugin: "p".into(),
            hook: "preInstall".into(),
            reason: "boom".into(),
            gating: true,
        };
        assert!(gating.is_fatal());
        let non_gating = PackratError::PluginHook {
            plugin: "p".into(),
            hook: "cacheHit".into(),
            reason: "boom".into(),
            gating: false,
        };
        assert!(!non_gating.is_fatal());
        assert!(!PackratError::CacheEntryNotFound("k".into()).is_fatal());
    }

    #[test]
    fn cloud_errors_degrade() {
        let err = PackratError::CloudAuth {
            provider: "s3".into(),
            reason: "denied".into(),
        };
        assert!(err.is_degradable());
        assert!(!PackratError::Internal("x".into()).is_degradable());
    }

    #[test]
    fn disk_full_is_fatal() {
        let err = PackratError::io("writing", std::io::Error::from_raw_os_error(libc::ENOSPC));
        assert!(matches!(err, PackratError::OrchestratorFatal(_)));

        let err = PackratError::io(
            "writing",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, PackratError::Io { .. }));
    }
}
