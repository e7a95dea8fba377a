//! Sync policy and remote object bookkeeping on top of a provider

use crate::cloud::factory::create_provider;
use crate::cloud::provider::CloudProvider;
use crate::config::{CloudConfig, SyncPolicy};
use crate::error::{PackratError, PackratResult};
use crate::fingerprint::PackageFingerprint;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Builds `{team_id?}/{prefix?}/{id}` object keys
///
/// Team and prefix partition one bucket into independent caches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectKey {
    team_id: Option<String>,
    prefix: Option<String>,
}

impl ObjectKey {
    pub fn new(team_id: Option<String>, prefix: Option<String>) -> Self {
        Self { team_id, prefix }
    }

    pub fn from_config(config: &CloudConfig) -> Self {
        Self::new(config.team_id.clone(), config.prefix.clone())
    }

    /// Key for a cached package tarball
    pub fn package(&self, fp: &PackageFingerprint) -> String {
        self.join(&format!("packages/{}.tgz", fp.key()))
    }

    /// Key for a project snapshot
    pub fn snapshot(&self, manifest_hash: &str) -> String {
        self.join(&format!("snapshots/{}.tar.zst", manifest_hash))
    }

    fn join(&self, id: &str) -> String {
        [self.team_id.as_deref(), self.prefix.as_deref()]
            .into_iter()
            .flatten()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .chain(std::iter::once(id))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Where a remote object stands relative to the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    LocalOnly,
    Uploaded,
    Stale,
}

/// A cache entry or snapshot as known to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudObject {
    pub remote_key: String,
    /// Fingerprint key or snapshot manifest hash
    pub id: String,
    pub sync_state: SyncState,
}

/// Result of a cloud lookup; never aborts the caller
#[derive(Debug)]
pub enum CloudFetchOutcome {
    Hit,
    Miss,
    /// Degraded to a miss; carried so the caller can report it
    Failed(PackratError),
}

/// Policy-driven access to the team cloud cache
pub struct CloudSync {
    provider: Arc<dyn CloudProvider>,
    keys: ObjectKey,
    policy: SyncPolicy,
    upload: bool,
    objects: Mutex<HashMap<String, CloudObject>>,
}

impl CloudSync {
    pub fn new(provider: Arc<dyn CloudProvider>, config: &CloudConfig) -> Self {
        Self {
            provider,
            keys: ObjectKey::from_config(config),
            policy: config.sync_policy,
            upload: config.upload,
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Build from configuration; `None` when the cloud cache is off
    pub fn from_config(config: &CloudConfig) -> PackratResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let provider = create_provider(config)?;
        Ok(Some(Self::new(provider, config)))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn keys(&self) -> &ObjectKey {
        &self.keys
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Whether pushes are allowed at all
    pub fn uploads_enabled(&self) -> bool {
        self.upload
    }

    /// Download a package tarball into `dest`
    pub async fn fetch_package(&self, fp: &PackageFingerprint, dest: &Path) -> CloudFetchOutcome {
        self.fetch(&self.keys.package(fp), &fp.key(), dest).await
    }

    /// Download a snapshot archive into `dest`
    pub async fn fetch_snapshot(&self, manifest_hash: &str, dest: &Path) -> CloudFetchOutcome {
        self.fetch(&self.keys.snapshot(manifest_hash), manifest_hash, dest).await
    }

    async fn fetch(&self, remote_key: &str, id: &str, dest: &Path) -> CloudFetchOutcome {
        match self.provider.download_file(remote_key, dest).await {
            Ok(()) => {
                debug!("Cloud hit: {}", remote_key);
                self.record(remote_key, id, SyncState::Uploaded).await;
                CloudFetchOutcome::Hit
            }
            Err(PackratError::CloudObjectNotFound(_)) => {
                debug!("Cloud miss: {}", remote_key);
                let _ = tokio::fs::remove_file(dest).await;
                CloudFetchOutcome::Miss
            }
            Err(e) => {
                warn!("Cloud download of {} failed, treating as miss: {}", remote_key, e);
                let _ = tokio::fs::remove_file(dest).await;
                CloudFetchOutcome::Failed(e)
            }
        }
    }

    /// Push a cached package; returns whether a remote write happened
    pub async fn push_package(&self, fp: &PackageFingerprint, local: &Path) -> PackratResult<bool> {
        self.push(local, &self.keys.package(fp), &fp.key()).await
    }

    /// Push a snapshot archive; returns whether a remote write happened
    pub async fn push_snapshot(&self, manifest_hash: &str, local: &Path) -> PackratResult<bool> {
        self.push(local, &self.keys.snapshot(manifest_hash), manifest_hash).await
    }

    async fn push(&self, local: &Path, remote_key: &str, id: &str) -> PackratResult<bool> {
        if !self.upload {
            return Ok(false);
        }

        if self.policy == SyncPolicy::UploadIfMissing {
            if self.state(remote_key).await == Some(SyncState::Uploaded) {
                return Ok(false);
            }
            match self.provider.exists(remote_key).await {
                Ok(true) => {
                    debug!("{} already present remotely", remote_key);
                    self.record(remote_key, id, SyncState::Uploaded).await;
                    return Ok(false);
                }
                Ok(false) => {}
                Err(e) => {
                    self.record_if_absent(remote_key, id, SyncState::LocalOnly).await;
                    return Err(e);
                }
            }
        }

        match self.provider.upload_file(local, remote_key).await {
            Ok(()) => {
                debug!("Uploaded {}", remote_key);
                self.record(remote_key, id, SyncState::Uploaded).await;
                Ok(true)
            }
            Err(e) => {
                self.record_if_absent(remote_key, id, SyncState::LocalOnly).await;
                Err(e)
            }
        }
    }

    /// Re-check an uploaded object; one that vanished becomes `Stale`
    pub async fn verify(&self, remote_key: &str) -> PackratResult<Option<SyncState>> {
        let Some(state) = self.state(remote_key).await else {
            return Ok(None);
        };
        if state != SyncState::Uploaded {
            return Ok(Some(state));
        }
        if self.provider.exists(remote_key).await? {
            return Ok(Some(SyncState::Uploaded));
        }

        warn!("Remote object {} disappeared", remote_key);
        let mut objects = self.objects.lock().await;
        if let Some(obj) = objects.get_mut(remote_key) {
            obj.sync_state = SyncState::Stale;
        }
        Ok(Some(SyncState::Stale))
    }

    /// Delete a remote object and forget it
    pub async fn delete(&self, remote_key: &str) -> PackratResult<()> {
        self.provider.delete_file(remote_key).await?;
        self.objects.lock().await.remove(remote_key);
        Ok(())
    }

    /// Objects touched during this run, sorted by key
    pub async fn objects(&self) -> Vec<CloudObject> {
        let mut objects: Vec<_> = self.objects.lock().await.values().cloned().collect();
        objects.sort_by(|a, b| a.remote_key.cmp(&b.remote_key));
        objects
    }

    async fn state(&self, remote_key: &str) -> Option<SyncState> {
        self.objects
            .lock()
            .await
            .get(remote_key)
            .map(|o| o.sync_state)
    }

    async fn record(&self, remote_key: &str, id: &str, state: SyncState) {
        self.objects.lock().await.insert(
            remote_key.to_string(),
            CloudObject {
                remote_key: remote_key.to_string(),
                id: id.to_string(),
                sync_state: state,
            },
        );
    }

    async fn record_if_absent(&self, remote_key: &str, id: &str, state: SyncState) {
        self.objects
            .lock()
            .await
            .entry(remote_key.to_string())
            .or_insert_with(|| CloudObject {
                remote_key: remote_key.to_string(),
                id: id.to_string(),
                sync_state: state,
            });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// In-memory object store counting remote writes
    #[derive(Default)]
    pub(crate) struct MemoryProvider {
        pub objects: StdMutex<HashMap<String, Vec<u8>>>,
        pub writes: AtomicUsize,
        pub fail_with_auth: bool,
    }

    impl MemoryProvider {
        fn check(&self) -> PackratResult<()> {
            if self.fail_with_auth {
                return Err(PackratError::CloudAuth {
                    provider: "memory".into(),
                    reason: "denied".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CloudProvider for MemoryProvider {
        async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()> {
            self.check()?;
            let bytes = std::fs::read(local).map_err(|e| PackratError::io("read", e))?;
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()> {
            self.check()?;
            let bytes = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| PackratError::CloudObjectNotFound(key.to_string()))?;
            std::fs::write(local, bytes).map_err(|e| PackratError::io("write", e))
        }

        async fn delete_file(&self, key: &str) -> PackratResult<()> {
            self.check()?;
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> PackratResult<bool> {
            self.check()?;
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn fp() -> PackageFingerprint {
        PackageFingerprint::compute("left-pad", "1.3.0", "sha512-abc", "").unwrap()
    }

    fn sync_with(provider: Arc<MemoryProvider>, policy: SyncPolicy) -> CloudSync {
        let config = CloudConfig {
            enabled: true,
            bucket: "b".into(),
            team_id: Some("acme".into()),
            sync_policy: policy,
            ..Default::default()
        };
        CloudSync::new(provider, &config)
    }

    #[test]
    fn object_keys_omit_empty_segments() {
        let fp = fp();
        assert_eq!(
            ObjectKey::new(Some("acme".into()), Some("/web/".into())).package(&fp),
            format!("acme/web/packages/{}.tgz", fp.key())
        );
        assert_eq!(ObjectKey::default().snapshot("h"), "snapshots/h.tar.zst");
        assert_eq!(
            ObjectKey::new(None, Some("".into())).snapshot("h"),
            "snapshots/h.tar.zst"
        );
    }

    #[tokio::test]
    async fn upload_if_missing_writes_once() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.tgz");
        std::fs::write(&local, b"bytes").unwrap();

        let provider = Arc::new(MemoryProvider::default());
        let sync = sync_with(Arc::clone(&provider), SyncPolicy::UploadIfMissing);

        assert!(sync.push_package(&fp(), &local).await.unwrap());
        assert!(!sync.push_package(&fp(), &local).await.unwrap());
        assert_eq!(provider.writes.load(Ordering::SeqCst), 1);

        // A second process sees the object remotely without writing
        let other = sync_with(Arc::clone(&provider), SyncPolicy::UploadIfMissing);
        assert!(!other.push_package(&fp(), &local).await.unwrap());
        assert_eq!(provider.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn always_upload_writes_every_time() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.tgz");
        std::fs::write(&local, b"bytes").unwrap();

        let provider = Arc::new(MemoryProvider::default());
        let sync = sync_with(Arc::clone(&provider), SyncPolicy::AlwaysUpload);

        sync.push_package(&fp(), &local).await.unwrap();
        sync.push_package(&fp(), &local).await.unwrap();
        assert_eq!(provider.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_degrades_failures_to_miss() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.tgz");

        let empty = sync_with(Arc::new(MemoryProvider::default()), SyncPolicy::UploadIfMissing);
        assert!(matches!(empty.fetch_package(&fp(), &dest).await, CloudFetchOutcome::Miss));

        let denied = sync_with(
            Arc::new(MemoryProvider {
                fail_with_auth: true,
                ..Default::default()
            }),
            SyncPolicy::UploadIfMissing,
        );
        match denied.fetch_package(&fp(), &dest).await {
            CloudFetchOutcome::Failed(e) => assert!(e.is_degradable()),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn vanished_object_becomes_stale() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.tgz");
        std::fs::write(&local, b"bytes").unwrap();

        let provider = Arc::new(MemoryProvider::default());
        let sync = sync_with(Arc::clone(&provider), SyncPolicy::UploadIfMissing);
        sync.push_package(&fp(), &local).await.unwrap();

        let key = sync.keys().package(&fp());
        provider.objects.lock().unwrap().clear();

        assert_eq!(sync.verify(&key).await.unwrap(), Some(SyncState::Stale));
        assert_eq!(sync.objects().await[0].sync_state, SyncState::Stale);
    }

    #[tokio::test]
    async fn failed_upload_stays_local_only() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.tgz");
        std::fs::write(&local, b"bytes").unwrap();

        let sync = sync_with(
            Arc::new(MemoryProvider {
                fail_with_auth: true,
                ..Default::default()
            }),
            SyncPolicy::AlwaysUpload,
        );
        assert!(sync.push_package(&fp(), &local).await.is_err());
        assert_eq!(sync.objects().await[0].sync_state, SyncState::LocalOnly);
    }
}
