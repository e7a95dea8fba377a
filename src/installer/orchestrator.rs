//! Install pipeline: cache, cloud, registry, extract, scripts

use crate::cache::CacheStore;
use crate::cloud::{CloudFetchOutcome, CloudSync};
use crate::config::{Config, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::error::{PackratError, PackratResult};
use crate::fingerprint::{Integrity, PackageFingerprint};
use crate::installer::report::{InstallOutcome, InstallReport, PackageResult, PackageSource, PackageStatus};
use crate::installer::scripts::{lifecycle_order, link_bins, run_lifecycle_scripts};
use crate::lockfile::{resolve_packages, ResolvedPackage, ResolvedSet};
use crate::plugin::{HookContext, HookDispatcher, HookPoint, PackageContext};
use crate::registry::{extract_tarball, PackageFetcher};
use futures_util::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Staged downloads older than this were left behind by a dead process
const PARTIAL_GRACE: Duration = Duration::from_secs(60 * 60);

/// Drives one install of a project
///
/// Collaborators are injected so tests can run against an isolated store,
/// an in-memory cloud and a local fetcher.
pub struct Installer {
    project: PathBuf,
    config: Config,
    store: CacheStore,
    cloud: Option<Arc<CloudSync>>,
    fetcher: Arc<dyn PackageFetcher>,
    hooks: HookDispatcher,
    cancel: Arc<AtomicBool>,
    abort: AtomicBool,
    progress: Option<ProgressBar>,
}

impl Installer {
    pub fn new(
        project: impl Into<PathBuf>,
        config: Config,
        store: CacheStore,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Self {
        Self {
            project: project.into(),
            config,
            store,
            cloud: None,
            fetcher,
            hooks: HookDispatcher::empty(),
            cancel: Arc::new(AtomicBool::new(false)),
            abort: AtomicBool::new(false),
            progress: None,
        }
    }

    pub fn with_cloud(mut self, cloud: Arc<CloudSync>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_hooks(mut self, hooks: HookDispatcher) -> Self {
        self.hooks = hooks;
        self
    }

    /// Flag checked before each package starts (set by Ctrl-C)
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn modules_dir(&self) -> PathBuf {
        self.project.join(&self.config.install.modules_dir)
    }

    fn base_context(&self) -> HookContext {
        HookContext::project(self.project.clone(), self.modules_dir())
            .with_flags(self.config.cache.enabled, self.cloud.is_some())
    }

    /// Install the project's resolved dependency set
    ///
    /// A fatal condition hands the whole install to the configured package
    /// manager when `install.fallback_to_npm` is set; otherwise it is
    /// returned.
    pub async fn install(&self) -> PackratResult<InstallReport> {
        let started = Instant::now();
        let result = self.run().await;

        let mut report = match result {
            Ok(report) => report,
            Err(e) if e.is_fatal() && self.config.install.fallback_to_npm => {
                warn!("{}", e);
                self.fall_back(&e).await
            }
            Err(e) => return Err(e),
        };
        report.duration = started.elapsed();
        Ok(report)
    }

    async fn run(&self) -> PackratResult<InstallReport> {
        self.store.ensure_writable().await?;
        match self.store.sweep_partials(PARTIAL_GRACE).await {
            Ok(0) => {}
            Ok(n) => debug!("Removed {} abandoned partial downloads", n),
            Err(e) => debug!("Could not sweep partial downloads: {}", e),
        }

        let ctx = self.base_context();
        let resolved = match resolve_packages(&self.project) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.hooks
                    .dispatch(HookPoint::DependencyResolutionError, &ctx.with_error(&e))
                    .await?;
                return Err(PackratError::OrchestratorFatal(format!(
                    "could not read the resolved dependency set: {}",
                    e
                )));
            }
        };

        let pre = self.hooks.dispatch(HookPoint::PreInstall, &ctx).await?;
        if let Some(plugin) = pre.vetoed_by {
            return Err(PackratError::Vetoed {
                plugin,
                hook: HookPoint::PreInstall.to_string(),
            });
        }

        info!(
            "Installing {} packages from {}",
            resolved.packages.len(),
            resolved.lockfile.kind
        );
        if let Some(pb) = &self.progress {
            pb.set_length(resolved.packages.len() as u64);
        }

        let concurrency = self
            .config
            .install
            .concurrency
            .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        let results: Vec<PackageResult> = stream::iter(resolved.packages.iter())
            .map(|pkg| self.install_package(pkg, &ctx))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let mut results = results;
        if let Some(fatal) = take_fatal(&mut results) {
            return Err(fatal);
        }

        let cancelled = self.cancel.load(Ordering::SeqCst);
        let mut report = InstallReport::new(if cancelled {
            InstallOutcome::Cancelled
        } else {
            InstallOutcome::Completed
        });

        if !cancelled {
            self.finish_packages(&resolved, &mut results, &mut report).await;
        }
        for result in results {
            report.record(result);
        }
        report.sort();

        if self.config.cache.max_age_days > 0 {
            let max_age = chrono::Duration::days(i64::from(self.config.cache.max_age_days));
            match self.store.prune(max_age).await {
                Ok(summary) if summary.removed > 0 => {
                    info!("Pruned {} idle cache entries", summary.removed)
                }
                Ok(_) => {}
                Err(e) => warn!("Cache pruning failed: {}", e),
            }
        }

        self.hooks.dispatch(HookPoint::PostInstall, &ctx).await?;
        Ok(report)
    }

    /// One package through the whole per-package pipeline
    async fn install_package(&self, pkg: &ResolvedPackage, base: &HookContext) -> PackageResult {
        let spec = format!("{}@{}", pkg.name, pkg.version);
        let install_path = self.project.join(&pkg.install_path);
        let result = |status| PackageResult {
            spec: spec.clone(),
            install_path: pkg.install_path.clone(),
            status,
        };

        if self.cancel.load(Ordering::SeqCst) || self.abort.load(Ordering::SeqCst) {
            return result(PackageStatus::Pending);
        }

        let status = match pkg.fingerprint() {
            Err(e) => {
                self.report_package_error(base, &e).await;
                PackageStatus::Failed(e)
            }
            Ok(fp) => {
                let ctx = base.with_package(PackageContext::new(&fp, install_path.clone()));
                self.install_fingerprint(&fp, &install_path, &ctx).await
            }
        };

        if let PackageStatus::Failed(e) = &status {
            if e.is_fatal() {
                self.abort.store(true, Ordering::SeqCst);
            }
        }
        if let Some(pb) = &self.progress {
            pb.set_message(spec.clone());
            pb.inc(1);
        }
        result(status)
    }

    async fn install_fingerprint(&self, fp: &PackageFingerprint, install_path: &Path, ctx: &HookContext) -> PackageStatus {
        match self.hooks.dispatch(HookPoint::PrePackageInstall, ctx).await {
            Ok(report) if report.is_vetoed() => {
                let by = report.vetoed_by.unwrap_or_default();
                info!("{} skipped by plugin {}", fp.spec(), by);
                return PackageStatus::Skipped { by };
            }
            Ok(_) => {}
            Err(e) => return PackageStatus::Failed(e),
        }

        match self.materialize(fp, install_path, ctx).await {
            Ok(source) => {
                let _ = self.hooks.dispatch(HookPoint::PostPackageInstall, ctx).await;
                PackageStatus::Installed(source)
            }
            Err(e) => {
                self.report_package_error(ctx, &e).await;
                PackageStatus::Failed(e)
            }
        }
    }

    async fn report_package_error(&self, ctx: &HookContext, e: &PackratError) {
        error!("{}", e);
        let _ = self.hooks.dispatch(HookPoint::PackageError, &ctx.with_error(e)).await;
    }

    /// cache -> cloud -> registry, then extract
    async fn materialize(&self, fp: &PackageFingerprint, install_path: &Path, ctx: &HookContext) -> PackratResult<PackageSource> {
        let cached = if self.config.cache.enabled {
            match self.store.get_verified(fp).await {
                Ok(path) => Some(path),
                Err(PackratError::CacheEntryNotFound(_)) => None,
                Err(e @ PackratError::CacheCorruption { .. }) => {
                    warn!("{}; fetching again", e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let (archive, source) = match cached {
            Some(path) => {
                let _ = self.hooks.dispatch(HookPoint::CacheHit, ctx).await;
                (path, PackageSource::Cache)
            }
            None => {
                if self.config.cache.enabled {
                    let _ = self.hooks.dispatch(HookPoint::CacheMiss, ctx).await;
                }
                self.fetch_remote(fp, ctx).await?
            }
        };

        let target = install_path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_tarball(&archive, &target))
            .await
            .map_err(|e| PackratError::Internal(format!("extract task failed: {}", e)))??;
        Ok(source)
    }

    /// Cloud first, then the registry; the result is published to the store
    async fn fetch_remote(&self, fp: &PackageFingerprint, ctx: &HookContext) -> PackratResult<(PathBuf, PackageSource)> {
        let staging = self.store.staging_path(fp).await?;

        if let Some(cloud) = &self.cloud {
            match cloud.fetch_package(fp, &staging).await {
                CloudFetchOutcome::Hit => match verify_download(fp, &staging).await {
                    Ok(()) => {
                        let entry = self.store.publish(fp, &staging).await?;
                        return Ok((entry.storage_path, PackageSource::Cloud));
                    }
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&staging).await;
                        let _ = self.hooks.dispatch(HookPoint::DownloadError, &ctx.with_error(&e)).await;
                    }
                },
                CloudFetchOutcome::Miss => {
                    let e = PackratError::CloudObjectNotFound(cloud.keys().package(fp));
                    let _ = self.hooks.dispatch(HookPoint::DownloadError, &ctx.with_error(&e)).await;
                }
                CloudFetchOutcome::Failed(e) => {
                    let _ = self.hooks.dispatch(HookPoint::DownloadError, &ctx.with_error(&e)).await;
                }
            }
        }

        let _ = self.hooks.dispatch(HookPoint::PreDownload, ctx).await;
        if let Err(e) = self.fetcher.fetch(fp, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            let _ = self.hooks.dispatch(HookPoint::DownloadError, &ctx.with_error(&e)).await;
            return Err(e);
        }
        let _ = self.hooks.dispatch(HookPoint::PostDownload, ctx).await;

        let entry = self.store.publish(fp, &staging).await?;

        if let Some(cloud) = self.cloud.as_ref().filter(|c| c.uploads_enabled()) {
            let _ = self.hooks.dispatch(HookPoint::PreUpload, ctx).await;
            match cloud.push_package(fp, &entry.storage_path).await {
                Ok(true) => {
                    let _ = self.hooks.dispatch(HookPoint::PostUpload, ctx).await;
                }
                Ok(false) => {}
                Err(e) => warn!("Upload of {} to the cloud cache failed: {}", fp.spec(), e),
            }
        }

        Ok((entry.storage_path, PackageSource::Network))
    }

    /// Bin links and lifecycle scripts, in dependency order
    async fn finish_packages(&self, resolved: &ResolvedSet, results: &mut [PackageResult], report: &mut InstallReport) {
        for idx in lifecycle_order(&resolved.packages) {
            let pkg = &resolved.packages[idx];
            let Some(result) = results
                .iter_mut()
                .find(|r| r.install_path == pkg.install_path)
            else {
                continue;
            };
            if !matches!(result.status, PackageStatus::Installed(_)) {
                continue;
            }

            if let Err(e) = link_bins(&self.project, pkg) {
                warn!("Could not link executables of {}: {}", result.spec, e);
            }
            if !self.config.install.run_scripts {
                continue;
            }
            match run_lifecycle_scripts(&self.project, &self.config.install.modules_dir, pkg).await {
                Ok(n) => report.scripts_run += n,
                Err(e) => {
                    error!("{}", e);
                    result.status = PackageStatus::Failed(e);
                }
            }
        }
    }

    /// Delegate the whole install to the package manager
    async fn fall_back(&self, cause: &PackratError) -> InstallReport {
        let reason = cause.to_string();
        let ctx = self.base_context().with_error(&reason);
        let _ = self.hooks.dispatch(HookPoint::InstallFallback, &ctx).await;

        let manager = self.config.install.package_manager;
        let (program, args) = manager.install_command();
        warn!("Falling back to `{} {}`", program, args.join(" "));

        let succeeded = match Command::new(program)
            .args(args)
            .current_dir(&self.project)
            .status()
            .await
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!("{} exited with {}", manager, status);
                false
            }
            Err(e) => {
                error!("Could not run {}: {}", program, e);
                false
            }
        };

        InstallReport::new(InstallOutcome::FellBack { reason, succeeded })
    }
}

/// Pull the first run-level failure out of the per-package results
fn take_fatal(results: &mut [PackageResult]) -> Option<PackratError> {
    let idx = results
        .iter()
        .position(|r| matches!(&r.status, PackageStatus::Failed(e) if e.is_fatal()))?;
    match std::mem::replace(&mut results[idx].status, PackageStatus::Pending) {
        PackageStatus::Failed(e) => Some(e),
        _ => None,
    }
}

/// Cloud objects are checked against the lockfile integrity before use
async fn verify_download(fp: &PackageFingerprint, path: &Path) -> PackratResult<()> {
    let Ok(integrity) = Integrity::parse(&fp.integrity) else {
        return Ok(());
    };
    let check = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || integrity.verify_file(&check))
        .await
        .map_err(|e| PackratError::Internal(format!("verification task failed: {}", e)))?
        .map_err(|e| PackratError::io(format!("reading {}", path.display()), e))?;

    outcome.map_err(|actual| PackratError::IntegrityMismatch {
        name: fp.spec(),
        expected: fp.integrity.clone(),
        actual,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cloud::sync::tests::MemoryProvider;
    use crate::config::{CloudConfig, SyncPolicy};
    use crate::plugin::{HookOutcome, Plugin, PluginRegistry};
    use crate::registry::tarball::tests::build_tgz;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Serves tarballs from a local directory, counting calls
    pub(crate) struct LocalFetcher {
        pub dir: PathBuf,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PackageFetcher for LocalFetcher {
        async fn fetch(&self, fp: &PackageFingerprint, dest: &Path) -> PackratResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let source = self.dir.join(tarball_name(&fp.name));
            tokio::fs::copy(&source, dest)
                .await
                .map_err(|e| PackratError::Registry {
                    url: source.display().to_string(),
                    reason: e.to_string(),
                })
        }
    }

    fn tarball_name(name: &str) -> String {
        format!("{}.tgz", name.replace('/', "+"))
    }

    fn sri(path: &Path) -> String {
        Integrity::parse("sha512-AAAA").unwrap().digest_file(path).unwrap()
    }

    /// Project with a package-lock over locally built tarballs
    pub(crate) struct Fixture {
        pub root: TempDir,
        pub fetcher: Arc<LocalFetcher>,
    }

    impl Fixture {
        /// `(name, package.json)` pairs, all hoisted
        pub fn new(packages: &[(&str, &str)]) -> Self {
            let root = TempDir::new().unwrap();
            let tarballs = root.path().join("tarballs");
            std::fs::create_dir_all(root.path().join("project")).unwrap();
            std::fs::create_dir_all(&tarballs).unwrap();

            let mut entries = BTreeMap::new();
            for (name, manifest) in packages {
                let path = tarballs.join(tarball_name(name));
                build_tgz(&path, &[("package.json", manifest), ("index.js", "module.exports = 1;\n")]);
                entries.insert(
                    format!("node_modules/{}", name),
                    serde_json::json!({
                        "version": "1.0.0",
                        "resolved": format!("https://registry.example/{}/-/{}", name, tarball_name(name)),
                        "integrity": sri(&path),
                    }),
                );
            }
            entries.insert(String::new(), serde_json::json!({ "name": "demo" }));
            let lock = serde_json::json!({ "name": "demo", "lockfileVersion": 3, "packages": entries });
            std::fs::write(
                root.path().join("project/package-lock.json"),
                serde_json::to_string_pretty(&lock).unwrap(),
            )
            .unwrap();

            Self {
                fetcher: Arc::new(LocalFetcher {
                    dir: tarballs,
                    calls: AtomicUsize::new(0),
                }),
                root,
            }
        }

        pub fn project(&self) -> PathBuf {
            self.root.path().join("project")
        }

        pub fn store(&self) -> CacheStore {
            CacheStore::new(self.root.path().join("store"))
        }

        pub fn config(&self) -> Config {
            let mut config = Config::default();
            config.install.fallback_to_npm = false;
            config
        }

        pub fn installer(&self, config: Config) -> Installer {
            Installer::new(self.project(), config, self.store(), self.fetcher.clone())
        }
    }

    struct VetoPackage(&'static str);

    #[async_trait]
    impl Plugin for VetoPackage {
        fn name(&self) -> &str {
            "veto"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn hooks(&self) -> BTreeSet<HookPoint> {
            [HookPoint::PrePackageInstall].into_iter().collect()
        }
        async fn handle(&self, _: HookPoint, ctx: &HookContext) -> PackratResult<HookOutcome> {
            match &ctx.package {
                Some(p) if p.name == self.0 => Ok(HookOutcome::Veto),
                _ => Ok(HookOutcome::Continue),
            }
        }
    }

    #[tokio::test]
    async fn second_install_is_served_from_cache() {
        let fx = Fixture::new(&[
            ("left-pad", r#"{"name":"left-pad"}"#),
            ("lodash", r#"{"name":"lodash"}"#),
        ]);

        let first = fx.installer(fx.config()).install().await.unwrap();
        assert_eq!(first.network_downloads, 2);
        assert!(fx.project().join("node_modules/lodash/index.js").is_file());

        std::fs::remove_dir_all(fx.project().join("node_modules")).unwrap();
        let second = fx.installer(fx.config()).install().await.unwrap();
        assert_eq!(second.cache_hits, 2);
        assert_eq!(second.network_downloads, 0);
        assert_eq!(fx.fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.installed, vec!["left-pad@1.0.0", "lodash@1.0.0"]);
        assert!(fx.project().join("node_modules/left-pad/package.json").is_file());
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_fetched_again() {
        let fx = Fixture::new(&[("left-pad", r#"{"name":"left-pad"}"#)]);
        fx.installer(fx.config()).install().await.unwrap();

        let store = fx.store();
        let entries = store.list().await.unwrap();
        std::fs::write(&entries[0].storage_path, b"garbage").unwrap();

        let report = fx.installer(fx.config()).install().await.unwrap();
        assert_eq!(report.network_downloads, 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn failed_package_does_not_stop_the_others() {
        let fx = Fixture::new(&[
            ("left-pad", r#"{"name":"left-pad"}"#),
            ("lodash", r#"{"name":"lodash"}"#),
        ]);
        std::fs::remove_file(fx.fetcher.dir.join("lodash.tgz")).unwrap();

        let report = fx.installer(fx.config()).install().await.unwrap();
        assert_eq!(report.installed, vec!["left-pad@1.0.0"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].spec, "lodash@1.0.0");
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn concurrency_does_not_change_the_result() {
        let names: Vec<String> = (0..20).map(|i| format!("pkg-{:02}", i)).collect();
        let manifests: Vec<String> = names.iter().map(|n| format!(r#"{{"name":"{}"}}"#, n)).collect();
        let packages: Vec<(&str, &str)> = names
            .iter()
            .zip(&manifests)
            .map(|(n, m)| (n.as_str(), m.as_str()))
            .collect();

        let mut reports = Vec::new();
        for concurrency in [1, 8] {
            let fx = Fixture::new(&packages);
            let mut config = fx.config();
            config.install.concurrency = concurrency;
            reports.push(fx.installer(config).install().await.unwrap());
        }
        assert_eq!(reports[0].installed, reports[1].installed);
        assert_eq!(reports[1].installed.len(), 20);
    }

    #[tokio::test]
    async fn vetoed_package_is_skipped() {
        let fx = Fixture::new(&[
            ("left-pad", r#"{"name":"left-pad"}"#),
            ("lodash", r#"{"name":"lodash"}"#),
        ]);
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(VetoPackage("lodash")));
        registry.load().await;

        let report = fx
            .installer(fx.config())
            .with_hooks(HookDispatcher::new(&registry))
            .install()
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["lodash@1.0.0"]);
        assert!(!fx.project().join("node_modules/lodash").exists());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn cancelled_run_leaves_packages_pending() {
        let fx = Fixture::new(&[("left-pad", r#"{"name":"left-pad"}"#)]);
        let report = fx
            .installer(fx.config())
            .with_cancel(Arc::new(AtomicBool::new(true)))
            .install()
            .await
            .unwrap();
        assert_eq!(report.outcome, InstallOutcome::Cancelled);
        assert_eq!(report.pending, vec!["left-pad@1.0.0"]);
        assert_eq!(report.exit_code(), 130);
    }

    #[tokio::test]
    async fn missing_lockfile_is_fatal_without_fallback() {
        let fx = Fixture::new(&[]);
        std::fs::remove_file(fx.project().join("package-lock.json")).unwrap();

        let err = fx.installer(fx.config()).install().await.unwrap_err();
        assert!(matches!(err, PackratError::OrchestratorFatal(_)));
    }

    #[tokio::test]
    async fn cloud_cache_serves_a_fresh_machine() {
        let fx = Fixture::new(&[("left-pad", r#"{"name":"left-pad"}"#)]);
        let provider = Arc::new(MemoryProvider::default());
        let cloud_config = CloudConfig {
            enabled: true,
            bucket: "team".into(),
            sync_policy: SyncPolicy::UploadIfMissing,
            ..Default::default()
        };

        let sync = Arc::new(CloudSync::new(provider.clone(), &cloud_config));
        fx.installer(fx.config()).with_cloud(sync).install().await.unwrap();
        assert_eq!(provider.writes.load(Ordering::SeqCst), 1);

        // Empty local store, same team bucket
        std::fs::remove_dir_all(fx.root.path().join("store")).unwrap();
        std::fs::remove_dir_all(fx.project().join("node_modules")).unwrap();
        let sync = Arc::new(CloudSync::new(provider.clone(), &cloud_config));
        let report = fx.installer(fx.config()).with_cloud(sync).install().await.unwrap();

        assert_eq!(report.cloud_hits, 1);
        assert_eq!(fx.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lifecycle_scripts_run_after_extraction() {
        let fx = Fixture::new(&[(
            "native",
            r#"{"name":"native","scripts":{"postinstall":"touch built.flag"}}"#,
        )]);

        let report = fx.installer(fx.config()).install().await.unwrap();
        assert_eq!(report.scripts_run, 1);
        assert!(fx.project().join("node_modules/native/built.flag").is_file());

        let mut config = fx.config();
        config.install.run_scripts = false;
        std::fs::remove_dir_all(fx.project().join("node_modules")).unwrap();
        let report = fx.installer(config).install().await.unwrap();
        assert_eq!(report.scripts_run, 0);
    }
}
