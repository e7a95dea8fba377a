//! Azure Blob Storage provider backed by the Azure CLI

use crate::cloud::provider::{run_cli, CloudProvider};
use crate::config::{CloudConfig, CloudCredentials};
use crate::error::{PackratError, PackratResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const NAME: &str = "azure";

/// Blob container accessed through `az storage blob`
///
/// The configured bucket is the container name. The storage account comes
/// from the credentials table or the ambient `AZURE_STORAGE_*` environment.
#[derive(Debug, Clone)]
pub struct AzureProvider {
    container: String,
    credentials: CloudCredentials,
    timeout: Duration,
}

impl AzureProvider {
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            container: config.bucket.clone(),
            credentials: config.credentials.clone().unwrap_or_default(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command(&self, action: &str, key: &str) -> Command {
        let mut cmd = Command::new("az");
        cmd.args(["storage", "blob", action]);
        cmd.args(["--container-name", &self.container, "--name", key]);
        cmd.args(["--only-show-errors"]);

        if let Some(account) = &self.credentials.account_name {
            cmd.env("AZURE_STORAGE_ACCOUNT", account);
        }
        if let Some(account_key) = &self.credentials.account_key {
            cmd.env("AZURE_STORAGE_KEY", account_key);
        } else {
            cmd.args(["--auth-mode", "login"]);
        }
        cmd
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()> {
        let mut cmd = self.command("upload", key);
        cmd.arg("--file").arg(local).arg("--overwrite");
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()> {
        let mut cmd = self.command("download", key);
        cmd.arg("--file").arg(local);
        run_cli(NAME, cmd, self.timeout).await.map(|_| ())
    }

    async fn delete_file(&self, key: &str) -> PackratResult<()> {
        let cmd = self.command("delete", key);
        match run_cli(NAME, cmd, self.timeout).await {
            Ok(_) | Err(PackratError::CloudObjectNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, key: &str) -> PackratResult<bool> {
        let mut cmd = self.command("exists", key);
        cmd.args(["--query", "exists", "--output", "tsv"]);
        let stdout = run_cli(NAME, cmd, self.timeout).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().eq_ignore_ascii_case("true"))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_replaces_login_auth() {
        let mut config = CloudConfig {
            bucket: "deps".to_string(),
            ..Default::default()
        };
        let args = |p: &AzureProvider| -> Vec<String> {
            p.command("exists", "k")
                .as_std()
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect()
        };

        assert!(args(&AzureProvider::new(&config)).contains(&"login".to_string()));

        config.credentials = Some(CloudCredentials {
            account_name: Some("acct".to_string()),
            account_key: Some("secret".to_string()),
            ..Default::default()
        });
        let provider = AzureProvider::new(&config);
        let args = args(&provider);
        assert!(!args.contains(&"login".to_string()));
        assert!(args.windows(2).any(|w| w == ["--container-name", "deps"]));
    }
}
