//! Integration tests for Packrat

/// Project on disk with a package-lock over locally built tarballs
mod fixture {
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use packrat::cache::CacheStore;
    use packrat::config::Config;
    use packrat::fingerprint::{Integrity, PackageFingerprint};
    use packrat::installer::Installer;
    use packrat::registry::PackageFetcher;
    use packrat::{PackratError, PackratResult};
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct LocalFetcher {
        pub dir: PathBuf,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PackageFetcher for LocalFetcher {
        async fn fetch(&self, fp: &PackageFingerprint, dest: &Path) -> PackratResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let source = self.dir.join(format!("{}.tgz", fp.name));
            tokio::fs::copy(&source, dest)
                .await
                .map_err(|e| PackratError::Registry {
                    url: source.display().to_string(),
                    reason: e.to_string(),
                })
        }
    }

    pub struct Project {
        pub root: TempDir,
        pub fetcher: Arc<LocalFetcher>,
    }

    fn build_tgz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("package/{}", name), content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    impl Project {
        pub fn new(names: &[&str]) -> Self {
            let root = TempDir::new().unwrap();
            let tarballs = root.path().join("tarballs");
            std::fs::create_dir_all(root.path().join("project")).unwrap();
            std::fs::create_dir_all(&tarballs).unwrap();

            let mut entries = BTreeMap::new();
            for name in names {
                let path = tarballs.join(format!("{}.tgz", name));
                let manifest = format!(r#"{{"name":"{}","version":"1.0.0"}}"#, name);
                build_tgz(&path, &[("package.json", &manifest), ("index.js", "module.exports = 1;\n")]);
                let integrity = Integrity::parse("sha512-AAAA").unwrap().digest_file(&path).unwrap();
                entries.insert(
                    format!("node_modules/{}", name),
                    serde_json::json!({
                        "version": "1.0.0",
                        "resolved": format!("https://registry.example/{0}/-/{0}-1.0.0.tgz", name),
                        "integrity": integrity,
                    }),
                );
            }
            entries.insert(String::new(), serde_json::json!({ "name": "demo" }));
            let lock = serde_json::json!({ "name": "demo", "lockfileVersion": 3, "packages": entries });

            let project = Self {
                fetcher: Arc::new(LocalFetcher {
                    dir: tarballs,
                    calls: AtomicUsize::new(0),
                }),
                root,
            };
            project.write_lockfile(&serde_json::to_string_pretty(&lock).unwrap());
            project
        }

        pub fn write_lockfile(&self, content: &str) {
            std::fs::write(self.dir().join("package-lock.json"), content).unwrap();
        }

        pub fn dir(&self) -> PathBuf {
            self.root.path().join("project")
        }

        pub fn cache_dir(&self) -> PathBuf {
            self.root.path().join("cache")
        }

        pub fn store(&self) -> CacheStore {
            CacheStore::new(self.cache_dir())
        }

        pub fn config(&self) -> Config {
            let mut config = Config::default();
            config.install.fallback_to_npm = false;
            config.cache.dir = Some(self.cache_dir());
            config
        }

        pub fn installer(&self, config: Config) -> Installer {
            Installer::new(self.dir(), config, self.store(), self.fetcher.clone())
        }

        /// Local config pointing the CLI at this project's cache
        pub fn write_local_config(&self) {
            let content = format!(
                "[cache]\ndir = {:?}\n\n[install]\nfallback_to_npm = false\n",
                self.cache_dir().display().to_string()
            );
            std::fs::write(self.dir().join(".packrat.toml"), content).unwrap();
        }
    }
}

mod cli_tests {
    use super::fixture::Project;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary isolated from the user's global config
    fn packrat(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("packrat");
        cmd.env("PACKRAT_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("JavaScript dependency installs"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("packrat"));
    }

    #[test]
    fn completions_for_bash() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("_packrat"));
    }

    #[test]
    fn config_path_honors_flag() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[install]"));
    }

    #[test]
    fn config_set_then_show() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .args(["config", "set", "install.concurrency", "3"])
            .assert()
            .success();
        packrat(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("concurrency = 3"));
    }

    #[test]
    fn invalid_concurrency_is_rejected() {
        let home = TempDir::new().unwrap();
        packrat(&home)
            .args(["install", "--concurrency", "32"])
            .assert()
            .failure();
    }

    #[test]
    fn analyze_reports_packages_as_json() {
        let home = TempDir::new().unwrap();
        let project = Project::new(&["left-pad", "lodash"]);
        project.write_local_config();

        packrat(&home)
            .arg("-C")
            .arg(project.dir())
            .args(["--no-interactive", "analyze", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"packages\": 2"))
            .stdout(predicate::str::contains("\"snapshot\": \"missing\""));
    }

    #[test]
    fn analyze_without_lockfile_fails() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        packrat(&home)
            .arg("-C")
            .arg(project.path())
            .args(["--no-interactive", "analyze"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn clean_snapshot_without_snapshot_succeeds() {
        let home = TempDir::new().unwrap();
        let project = Project::new(&["left-pad"]);

        packrat(&home)
            .arg("-C")
            .arg(project.dir())
            .args(["--no-interactive", "clean-snapshot"])
            .assert()
            .success();
    }

    #[test]
    fn restore_without_snapshot_fails_with_hint() {
        let home = TempDir::new().unwrap();
        let project = Project::new(&["left-pad"]);
        project.write_local_config();

        packrat(&home)
            .arg("-C")
            .arg(project.dir())
            .args(["--no-interactive", "restore"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn clean_modules_is_idempotent() {
        let home = TempDir::new().unwrap();
        let project = Project::new(&["left-pad"]);
        std::fs::create_dir_all(project.dir().join("node_modules/left-pad")).unwrap();

        for _ in 0..2 {
            packrat(&home)
                .arg("-C")
                .arg(project.dir())
                .args(["--no-interactive", "clean-modules"])
                .assert()
                .success();
        }
        assert!(!project.dir().join("node_modules").exists());
    }

    #[test]
    fn plugin_list_with_empty_manifest() {
        let home = TempDir::new().unwrap();
        let manifest = home.path().join("plugins.toml");
        std::fs::write(
            home.path().join("config.toml"),
            format!("[plugins]\nmanifest = {:?}\n", manifest.display().to_string()),
        )
        .unwrap();

        packrat(&home)
            .args(["--no-interactive", "plugin", "list"])
            .assert()
            .success();
    }
}

mod scenario_tests {
    use super::fixture::Project;
    use async_trait::async_trait;
    use packrat::cloud::{CloudProvider, CloudSync};
    use packrat::config::{CloudConfig, SyncPolicy};
    use packrat::lockfile::resolve_packages;
    use packrat::plugin::{HookContext, HookDispatcher, HookOutcome, HookPoint, Plugin, PluginRegistry};
    use packrat::snapshot::{SnapshotArchiver, SnapshotStatus};
    use packrat::{PackratError, PackratResult};
    use std::collections::{BTreeSet, HashMap};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemoryBucket {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CloudProvider for MemoryBucket {
        async fn upload_file(&self, local: &Path, key: &str) -> PackratResult<()> {
            let bytes = std::fs::read(local).map_err(|e| PackratError::io("read", e))?;
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn download_file(&self, key: &str, local: &Path) -> PackratResult<()> {
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
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> PackratResult<bool> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn cloud(bucket: Arc<MemoryBucket>) -> Arc<CloudSync> {
        let config = CloudConfig {
            enabled: true,
            bucket: "deps".into(),
            team_id: Some("web".into()),
            sync_policy: SyncPolicy::UploadIfMissing,
            ..Default::default()
        };
        Arc::new(CloudSync::new(bucket, &config))
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        priority: i32,
        dependencies: Vec<String>,
        log: Log,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }
        fn hooks(&self) -> BTreeSet<HookPoint> {
            [HookPoint::PreInstall, HookPoint::PostInstall].into_iter().collect()
        }
        async fn handle(&self, point: HookPoint, _: &HookContext) -> PackratResult<HookOutcome> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, point));
            Ok(HookOutcome::Continue)
        }
    }

    #[tokio::test]
    async fn snapshot_restores_deleted_tree() {
        let project = Project::new(&["left-pad", "lodash"]);
        let config = project.config();
        let report = project.installer(config.clone()).install().await.unwrap();
        assert!(report.is_success());

        let archiver = SnapshotArchiver::from_config(&config);
        let resolved = resolve_packages(&project.dir()).unwrap();
        let snapshot = archiver.create(&project.dir(), &resolved).await.unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.size_bytes > 0);

        std::fs::remove_dir_all(project.dir().join("node_modules")).unwrap();
        let manifest = archiver.restore(&project.dir()).await.unwrap();
        assert_eq!(manifest.id, snapshot.id);
        assert!(project.dir().join("node_modules/lodash/index.js").is_file());
        assert!(matches!(
            archiver.status(&project.dir()).await.unwrap(),
            SnapshotStatus::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn stale_snapshot_is_refused() {
        let project = Project::new(&["left-pad"]);
        let config = project.config();
        project.installer(config.clone()).install().await.unwrap();

        let archiver = SnapshotArchiver::from_config(&config);
        let resolved = resolve_packages(&project.dir()).unwrap();
        archiver.create(&project.dir(), &resolved).await.unwrap();

        let lock = std::fs::read_to_string(project.dir().join("package-lock.json")).unwrap();
        project.write_lockfile(&lock.replace("\"demo\"", "\"renamed\""));
        std::fs::write(project.dir().join("node_modules/left-pad/marker"), "kept").unwrap();

        let err = archiver.restore(&project.dir()).await.unwrap_err();
        assert!(matches!(err, PackratError::SnapshotStale { .. }));
        assert!(project.dir().join("node_modules/left-pad/marker").is_file());
    }

    #[tokio::test]
    async fn plugins_fire_by_priority() {
        let project = Project::new(&["left-pad"]);
        let log: Log = Arc::default();

        let mut registry = PluginRegistry::new();
        for (name, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
            registry.register(Arc::new(Recorder {
                name,
                priority,
                dependencies: vec![],
                log: log.clone(),
            }));
        }
        registry.load().await;

        project
            .installer(project.config())
            .with_hooks(HookDispatcher::new(&registry))
            .install()
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let pre: Vec<&str> = log
            .iter()
            .filter(|e| e.ends_with(HookPoint::PreInstall.as_str()))
            .map(|e| e.split(':').next().unwrap_or_default())
            .collect();
        assert_eq!(pre, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn plugin_with_missing_dependency_is_disabled() {
        let log: Log = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder {
            name: "audit",
            priority: 0,
            dependencies: vec!["license-check".into()],
            log: log.clone(),
        }));
        registry.load().await;

        assert_eq!(registry.enabled().count(), 0);
        let audit = &registry.registrations()[0];
        assert!(!audit.is_enabled());
        assert!(audit.disabled_reason().is_some());

        let project = Project::new(&["left-pad"]);
        project
            .installer(project.config())
            .with_hooks(HookDispatcher::new(&registry))
            .install()
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn team_cache_uploads_once_and_serves_other_machines() {
        let bucket = Arc::new(MemoryBucket::default());

        let first = Project::new(&["left-pad"]);
        for _ in 0..2 {
            let _ = std::fs::remove_dir_all(first.dir().join("node_modules"));
            first
                .installer(first.config())
                .with_cloud(cloud(bucket.clone()))
                .install()
                .await
                .unwrap();
        }
        assert_eq!(bucket.writes.load(Ordering::SeqCst), 1);

        // Same lockfile, empty local cache, no registry access
        let second = Project::new(&["left-pad"]);
        std::fs::copy(
            first.dir().join("package-lock.json"),
            second.dir().join("package-lock.json"),
        )
        .unwrap();
        std::fs::remove_dir_all(&second.fetcher.dir).unwrap();

        let report = second
            .installer(second.config())
            .with_cloud(cloud(bucket.clone()))
            .install()
            .await
            .unwrap();
        assert_eq!(report.cloud_hits, 1);
        assert_eq!(report.network_downloads, 0);
        assert!(second.dir().join("node_modules/left-pad/index.js").is_file());
    }
}
