//! Install results

use crate::error::PackratError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Where a package's bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageSource {
    Cache,
    Cloud,
    Network,
}

/// Per-package result inside one run
#[derive(Debug)]
pub enum PackageStatus {
    Installed(PackageSource),
    /// Vetoed by a plugin at `prePackageInstall`
    Skipped { by: String },
    Failed(PackratError),
    /// Never started (cancelled or aborted run)
    Pending,
}

#[derive(Debug)]
pub struct PackageResult {
    pub spec: String,
    pub install_path: PathBuf,
    pub status: PackageStatus,
}

/// How the run as a whole ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InstallOutcome {
    Completed,
    /// Interrupted; the next install resumes from the cache
    Cancelled,
    /// Delegated to the package manager after a fatal error
    FellBack { reason: String, succeeded: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPackage {
    pub spec: String,
    pub error: String,
}

/// Summary of one install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    /// Packages materialized this run, sorted
    pub installed: Vec<String>,
    pub cache_hits: usize,
    pub cloud_hits: usize,
    pub network_downloads: usize,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedPackage>,
    pub pending: Vec<String>,
    pub scripts_run: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl InstallReport {
    pub fn new(outcome: InstallOutcome) -> Self {
        Self {
            outcome,
            installed: Vec::new(),
            cache_hits: 0,
            cloud_hits: 0,
            network_downloads: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            scripts_run: 0,
            duration: Duration::ZERO,
        }
    }

    /// Fold per-package results into the counters
    pub(crate) fn record(&mut self, result: PackageResult) {
        match result.status {
            PackageStatus::Installed(source) => {
                match source {
                    PackageSource::Cache => self.cache_hits += 1,
                    PackageSource::Cloud => self.cloud_hits += 1,
                    PackageSource::Network => self.network_downloads += 1,
                }
                self.installed.push(result.spec);
            }
            PackageStatus::Skipped { .. } => self.skipped.push(result.spec),
            PackageStatus::Failed(e) => self.failed.push(FailedPackage {
                spec: result.spec,
                error: e.to_string(),
            }),
            PackageStatus::Pending => self.pending.push(result.spec),
        }
    }

    pub(crate) fn sort(&mut self) {
        self.installed.sort();
        self.skipped.sort();
        self.pending.sort();
        self.failed.sort_by(|a, b| a.spec.cmp(&b.spec));
    }

    /// False when any package failed, the run was cancelled, or the
    /// fallback package manager failed
    pub fn is_success(&self) -> bool {
        let outcome_ok = match &self.outcome {
            InstallOutcome::Completed => true,
            InstallOutcome::Cancelled => false,
            InstallOutcome::FellBack { succeeded, .. } => *succeeded,
        };
        outcome_ok && self.failed.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            InstallOutcome::Cancelled => 130,
            _ if self.is_success() => 0,
            _ => 1,
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
