//! Cloud object store abstraction
//!
//! Provides a trait for object operations that can be implemented by
//! different backends (S3, Azure Blob Storage, Google Cloud Storage).

use crate::error::{PackratError, PackratResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Abstract object store interface
///
/// Every failure is typed: `CloudAuth`, `CloudObjectNotFound` or
/// `CloudUnavailable`. Callers in the install path degrade all of them to a
/// cache miss.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Upload a local file to `key`, replacing any existing object
    async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()>;

    /// Download `key` into a local file
    async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()>;

    /// Delete `key`; deleting a missing object is not an error
    async fn delete_file(&self, key: &str) -> PackratResult<()>;

    /// Check whether `key` exists
    async fn exists(&self, key: &str) -> PackratResult<bool>;

    /// Provider name for display (`s3`, `azure`, `gcp`)
    fn name(&self) -> &'static str;
}

/// Run a provider CLI and return its stdout
///
/// A missing binary or a timeout is `CloudUnavailable`; a non-zero exit is
/// classified from stderr.
pub(crate) async fn run_cli(
    provider: &'static str,
    mut cmd: Command,
    timeout: Duration,
) -> PackratResult<Vec<u8>> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    debug!("Running {} CLI: {:?}", provider, cmd.as_std());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            return Err(PackratError::CloudUnavailable {
                provider: provider.to_string(),
                reason: format!("{} timed out after {}s", program, timeout.as_secs()),
            })
        }
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(PackratError::CloudUnavailable {
                provider: provider.to_string(),
                reason: format!("{} CLI not found in PATH", program),
            })
        }
        Ok(Err(e)) => {
            return Err(PackratError::CloudUnavailable {
                provider: provider.to_string(),
                reason: e.to_string(),
            })
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify_failure(provider, stderr.trim()));
    }
    Ok(output.stdout)
}

/// Map CLI stderr to a typed cloud error
pub(crate) fn classify_failure(provider: &str, stderr: &str) -> PackratError {
    let lower = stderr.to_lowercase();

    let not_found = ["(404)", "nosuchkey", "not found", "blobnotfound", "does not exist"];
    if not_found.iter().any(|m| lower.contains(m)) {
        return PackratError::CloudObjectNotFound(stderr.to_string());
    }

    let auth = [
        "accessdenied",
        "access denied",
        "(403)",
        "unable to locate credentials",
        "invalidaccesskeyid",
        "signaturedoesnotmatch",
        "expiredtoken",
        "authorizationfailure",
        "authenticationfailed",
        "please run 'az login'",
        "gcloud auth login",
        "permission denied",
        "credentials",
    ];
    if auth.iter().any(|m| lower.contains(m)) {
        return PackratError::CloudAuth {
            provider: provider.to_string(),
            reason: stderr.to_string(),
        };
    }

    PackratError::CloudUnavailable {
        provider: provider.to_string(),
        reason: if stderr.is_empty() {
            "command failed without output".to_string()
        } else {
            stderr.to_string()
        },
    }
}

/// `exists` on top of a probe whose not-found error means "absent"
pub(crate) fn absent_on_not_found(result: PackratResult<Vec<u8>>) -> PackratResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(PackratError::CloudObjectNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_objects() {
        let err = classify_failure(
            "s3",
            "An error occurred (404) when calling the HeadObject operation: Not Found",
        );
        assert!(matches!(err, PackratError::CloudObjectNotFound(_)));

        let err = classify_failure("azure", "ErrorCode:BlobNotFound");
        assert!(matches!(err, PackratError::CloudObjectNotFound(_)));
    }

    #[test]
    fn classifies_auth_failures() {
        let err = classify_failure("s3", "Unable to locate credentials. You can configure credentials by running \"aws configure\".");
        assert!(matches!(err, PackratError::CloudAuth { .. }));

        let err = classify_failure("gcp", "ERROR: (gcloud.storage.cp) You do not currently have an active account selected. Please run: gcloud auth login");
        assert!(matches!(err, PackratError::CloudAuth { .. }));
    }

    #[test]
    fn everything_else_is_unavailable() {
        let err = classify_failure("s3", "Could not connect to the endpoint URL");
        assert!(matches!(err, PackratError::CloudUnavailable { .. }));
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let cmd = Command::new("packrat-definitely-not-a-real-cli");
        let err = run_cli("s3", cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PackratError::CloudUnavailable { .. }));
    }

    #[test]
    fn not_found_probe_means_absent() {
        assert!(!absent_on_not_found(Err(PackratError::CloudObjectNotFound("k".into()))).unwrap());
        assert!(absent_on_not_found(Ok(vec![])).unwrap());
    }
}
