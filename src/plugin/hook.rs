//! Hook points, handler context and return contract

use crate::fingerprint::PackageFingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle stages plugins can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookPoint {
    PreInstall,
    PostInstall,
    PrePackageInstall,
    PostPackageInstall,
    PackageError,
    CacheHit,
    CacheMiss,
    PreDownload,
    PostDownload,
    DownloadError,
    PreUpload,
    PostUpload,
    PreSnapshot,
    PostSnapshot,
    PreRestore,
    PostRestore,
    DependencyResolutionError,
    InstallFallback,
    PluginError,
}

impl HookPoint {
    /// Every hook point, in declaration order
    pub const ALL: [HookPoint; 19] = [
        Self::PreInstall,
        Self::PostInstall,
        Self::PrePackageInstall,
        Self::PostPackageInstall,
        Self::PackageError,
        Self::CacheHit,
        Self::CacheMiss,
        Self::PreDownload,
        Self::PostDownload,
        Self::DownloadError,
        Self::PreUpload,
        Self::PostUpload,
        Self::PreSnapshot,
        Self::PostSnapshot,
        Self::PreRestore,
        Self::PostRestore,
        Self::DependencyResolutionError,
        Self::InstallFallback,
        Self::PluginError,
    ];

    /// A handler failure at a gating point aborts the current operation
    pub fn is_gating(&self) -> bool {
        matches!(self, Self::PreInstall | Self::DependencyResolutionError)
    }

    /// Whether a `Veto` outcome cancels the operation at this point
    pub fn honors_veto(&self) -> bool {
        matches!(
            self,
            Self::PreInstall | Self::PrePackageInstall | Self::PreSnapshot | Self::PreRestore
        )
    }

    /// Wire name (`prePackageInstall`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreInstall => "preInstall",
            Self::PostInstall => "postInstall",
            Self::PrePackageInstall => "prePackageInstall",
            Self::PostPackageInstall => "postPackageInstall",
            Self::PackageError => "packageError",
            Self::CacheHit => "cacheHit",
            Self::CacheMiss => "cacheMiss",
            Self::PreDownload => "preDownload",
            Self::PostDownload => "postDownload",
            Self::DownloadError => "downloadError",
            Self::PreUpload => "preUpload",
            Self::PostUpload => "postUpload",
            Self::PreSnapshot => "preSnapshot",
            Self::PostSnapshot => "postSnapshot",
            Self::PreRestore => "preRestore",
            Self::PostRestore => "postRestore",
            Self::DependencyResolutionError => "dependencyResolutionError",
            Self::InstallFallback => "installFallback",
            Self::PluginError => "pluginError",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown hook point '{}'", s))
    }
}

/// What a handler tells the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookOutcome {
    #[default]
    Continue,
    /// Cancel the current operation (only honored at pre-* points)
    Veto,
}

/// Package currently being processed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContext {
    pub name: String,
    pub version: String,
    pub key: String,
    pub install_path: PathBuf,
}

impl PackageContext {
    pub fn new(fp: &PackageFingerprint, install_path: PathBuf) -> Self {
        Self {
            name: fp.name.clone(),
            version: fp.version.clone(),
            key: fp.key(),
            install_path,
        }
    }
}

/// Read-only view handed to handlers for one dispatch
///
/// Handlers cannot reach orchestrator state through it; they influence the
/// run only through [`HookOutcome`] and errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    pub project_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub package: Option<PackageContext>,
    pub cache_enabled: bool,
    pub cloud_enabled: bool,
    pub network_allowed: bool,
    /// Failure being reported (packageError, downloadError, pluginError, ...)
    pub error: Option<String>,
    /// Plugin whose handler failed (pluginError only)
    pub failed_plugin: Option<String>,
}

impl HookContext {
    /// Context for project-level operations
    pub fn project(project_dir: PathBuf, modules_dir: PathBuf) -> Self {
        Self {
            project_dir,
            modules_dir,
            package: None,
            cache_enabled: true,
            cloud_enabled: false,
            network_allowed: true,
            error: None,
            failed_plugin: None,
        }
    }

    pub fn with_flags(mut self, cache_enabled: bool, cloud_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self.cloud_enabled = cloud_enabled;
        self
    }

    pub fn with_package(&self, package: PackageContext) -> Self {
        let mut ctx = self.clone();
        ctx.package = Some(package);
        ctx
    }

    pub fn with_error(&self, error: impl fmt::Display) -> Self {
        let mut ctx = self.clone();
        ctx.error = Some(error.to_string());
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_roundtrip() {
        for point in HookPoint::ALL {
            assert_eq!(point.as_str().parse::<HookPoint>().unwrap(), point);
            let json = serde_json::to_string(&point).unwrap();
            assert_eq!(json, format!("\"{}\"", point.as_str()));
        }
    }

    #[test]
    fn unknown_hook_rejected() {
        assert!("onEverything".parse::<HookPoint>().is_err());
    }

    #[test]
    fn gating_points() {
        assert!(HookPoint::DependencyResolutionError.is_gating());
        assert!(HookPoint::PreInstall.is_gating());
        assert!(!HookPoint::PackageError.is_gating());
        assert!(!HookPoint::PluginError.is_gating());
    }

    #[test]
    fn context_serializes_camel_case() {
        let ctx = HookContext::project(PathBuf::from("/p"), PathBuf::from("/p/node_modules"))
            .with_error("boom");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["projectDir"], "/p");
        assert_eq!(json["error"], "boom");
        assert!(json["package"].is_null());
    }
}
