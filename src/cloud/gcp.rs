//! Google Cloud Storage provider backed by the gcloud CLI

use crate::cloud::provider::{absent_on_not_found, run_cli, CloudProvider};
use crate::config::CloudConfig;
use crate::error::{PackratError, PackratResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const NAME: &str = "gcp";

/// GCS bucket accessed through `gcloud storage`
#[derive(Debug, Clone)]
pub struct GcpProvider {
    bucket: String,
    project: Option<String>,
    timeout: Duration,
}

impl GcpProvider {
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            project: config.credentials.as_ref().and_then(|c| c.project.clone()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("gcloud");
        cmd.args(["storage"]);
        if let Some(project) = &self.project {
            cmd.env("CLOUDSDK_CORE_PROJECT", project);
        }
        cmd.env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1");
        cmd
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()> {
        let mut cmd = self.command();
        cmd.arg("cp").arg(local).arg(self.uri(key));
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()> {
        let mut cmd = self.command();
        cmd.arg("cp").arg(self.uri(key)).arg(local);
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn delete_file(&self, key: &str) -> PackratResult<()> {
        let mut cmd = self.command();
        cmd.arg("rm").arg(self.uri(key));
        match run_cli(NAME, cmd, self.timeout).await {
            Ok(_) | Err(PackratError::CloudObjectNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, key: &str) -> PackratResult<bool> {
        let mut cmd = self.command();
        cmd.args(["objects", "describe"])
            .arg(self.uri(key))
            .arg("--format=value(name)");
        absent_on_not_found(run_cli(NAME, cmd, self.timeout).await)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
