//! Amazon S3 provider backed by the AWS CLI

use crate::cloud::provider::{absent_on_not_found, run_cli, CloudProvider};
use crate::config::{CloudConfig, CloudCredentials};
use crate::error::PackratResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const NAME: &str = "s3";

/// S3 bucket accessed through `aws s3` / `aws s3api`
#[derive(Debug, Clone)]
pub struct S3Provider {
    bucket: String,
    region: Option<String>,
    credentials: CloudCredentials,
    timeout: Duration,
}

impl S3Provider {
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            credentials: config.credentials.clone().unwrap_or_default(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("aws");
        cmd.args(args);
        cmd.args(["--only-show-errors"]);

        if let Some(region) = &self.region {
            cmd.args(["--region", region]);
        }
        if let Some(profile) = &self.credentials.profile {
            cmd.args(["--profile", profile]);
        }
        if let Some(key_id) = &self.credentials.access_key_id {
            cmd.env("AWS_ACCESS_KEY_ID", key_id);
        }
        if let Some(secret) = &self.credentials.secret_access_key {
            cmd.env("AWS_SECRET_ACCESS_KEY", secret);
        }
        cmd
    }
}

#[async_trait]
impl CloudProvider for S3Provider {
    async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()> {
        let local = local.to_string_lossy();
        let cmd = self.command(&["s3", "cp", &local, &self.uri(key)]);
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()> {
        let local = local.to_string_lossy();
        let cmd = self.command(&["s3", "cp", &self.uri(key), &local]);
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn delete_file(&self, key: &str) -> PackratResult<()> {
        let cmd = self.command(&["s3", "rm", &self.uri(key)]);
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn exists(&self, key: &str) -> PackratResult<bool> {
        let cmd = self.command(&["s3api", "head-object", "--bucket", &self.bucket, "--key", key]);
        absent_on_not_found(run_cli(NAME, cmd, self.timeout).await)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
