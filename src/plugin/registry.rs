//! Plugin registration, ordering and dependency resolution

use crate::error::{PackratError, PackratResult};
use crate::plugin::command::{CommandPlugin, PluginManifest};
use crate::plugin::hook::HookPoint;
use crate::plugin::traits::Plugin;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One registered plugin and its load-time state
#[derive(Clone)]
pub struct Registration {
    plugin: Arc<dyn Plugin>,
    order: usize,
    enabled: bool,
    initialized: bool,
    disabled_reason: Option<String>,
}

impl Registration {
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn version(&self) -> &str {
        self.plugin.version()
    }

    pub fn priority(&self) -> i32 {
        self.plugin.priority()
    }

    pub fn hooks(&self) -> BTreeSet<HookPoint> {
        self.plugin.hooks()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    fn disable(&mut self, reason: String) {
        self.enabled = false;
        self.disabled_reason = Some(reason);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .field("order", &self.order)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Ordered set of plugins for one run
///
/// Nothing that happens while loading is fatal. Broken or unsatisfied
/// plugins are disabled and reported through [`diagnostics`](Self::diagnostics).
#[derive(Debug, Default)]
pub struct PluginRegistry {
    registrations: Vec<Registration>,
    diagnostics: Vec<PackratError>,
    loaded: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the manifest's command plugins
    pub async fn from_manifest(manifest: &PluginManifest) -> PackratResult<Self> {
        let load = manifest.load().await?;
        let mut registry = Self::new();
        registry.diagnostics.extend(load.rejected);

        for spec in load.specs {
            let enabled = spec.enabled;
            match CommandPlugin::new(spec) {
                Ok(plugin) if enabled => registry.register(Arc::new(plugin)),
                Ok(plugin) => registry.register_disabled(Arc::new(plugin), "disabled in manifest"),
                Err(e) => {
                    warn!("{}", e);
                    registry.diagnostics.push(e);
                }
            }
        }
        Ok(registry)
    }

    /// Add a plugin; a duplicate name is reported and ignored
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.push(plugin, None);
    }

    /// Add a plugin that stays listed but never runs
    pub fn register_disabled(&mut self, plugin: Arc<dyn Plugin>, reason: impl Into<String>) {
        self.push(plugin, Some(reason.into()));
    }

    fn push(&mut self, plugin: Arc<dyn Plugin>, disabled: Option<String>) {
        if self.registrations.iter().any(|r| r.name() == plugin.name()) {
            self.diagnose(plugin.name(), "a plugin with this name is already registered");
            return;
        }
        let order = self.registrations.len();
        self.registrations.push(Registration {
            plugin,
            order,
            enabled: disabled.is_none(),
            initialized: false,
            disabled_reason: disabled,
        });
        self.loaded = false;
    }

    /// Order, initialize and dependency-check every registration
    pub async fn load(&mut self) {
        if self.loaded {
            return;
        }

        self.registrations
            .sort_by(|a, b| b.priority().cmp(&a.priority()).then(a.order.cmp(&b.order)));

        // Plugins that can never be satisfied are not initialized at all
        self.resolve_dependencies();

        for idx in 0..self.registrations.len() {
            if !self.registrations[idx].enabled || self.registrations[idx].initialized {
                continue;
            }
            let plugin = Arc::clone(&self.registrations[idx].plugin);
            let reason = match plugin.init().await {
                Ok(true) => None,
                Ok(false) => Some("init reported failure".to_string()),
                Err(e) => Some(format!("init failed: {}", e)),
            };
            self.registrations[idx].initialized = true;
            if let Some(reason) = reason {
                self.diagnose(plugin.name(), &reason);
                self.registrations[idx].disable(reason);
            }
        }

        // A failed init can unsatisfy plugins that were fine before
        let newly_disabled = self.resolve_dependencies();
        for idx in newly_disabled {
            let reg = &self.registrations[idx];
            if reg.initialized {
                if let Err(e) = reg.plugin.cleanup().await {
                    warn!("Cleanup of plugin {} failed: {}", reg.name(), e);
                }
            }
        }

        self.loaded = true;
        debug!(
            "Loaded {} plugins ({} enabled)",
            self.registrations.len(),
            self.enabled().count()
        );
    }

    /// Disable plugins whose dependencies are missing or disabled, until
    /// nothing changes. Returns the indices disabled by this pass.
    fn resolve_dependencies(&mut self) -> Vec<usize> {
        let mut disabled = Vec::new();
        loop {
            let available: HashSet<String> = self
                .registrations
                .iter()
                .filter(|r| r.enabled)
                .map(|r| r.name().to_string())
                .collect();
            let known: HashSet<String> = self
                .registrations
                .iter()
                .map(|r| r.name().to_string())
                .collect();

            let mut changed = false;
            for idx in 0..self.registrations.len() {
                if !self.registrations[idx].enabled {
                    continue;
                }
                let deps = self.registrations[idx].plugin.dependencies();
                let Some(dep) = deps.iter().find(|d| !available.contains(d.as_str())) else {
                    continue;
                };
                let reason = if known.contains(dep.as_str()) {
                    format!("dependency {} is disabled", dep)
                } else {
                    format!("missing dependency {}", dep)
                };
                let name = self.registrations[idx].name().to_string();
                self.diagnose(&name, &reason);
                self.registrations[idx].disable(reason);
                disabled.push(idx);
                changed = true;
            }
            if !changed {
                return disabled;
            }
        }
    }

    fn diagnose(&mut self, name: &str, reason: &str) {
        let err = PackratError::PluginLoad {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        warn!("{}", err);
        self.diagnostics.push(err);
    }

    /// Every registration, in dispatch order once loaded
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Enabled registrations in dispatch order
    pub fn enabled(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(|r| r.enabled)
    }

    /// Load-time problems (rejected declarations, disabled plugins)
    pub fn diagnostics(&self) -> &[PackratError] {
        &self.diagnostics
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plugin::hook::{HookContext, HookOutcome};
    use async_trait::async_trait;

    /// In-process plugin for registry and dispatcher tests
    pub(crate) struct TestPlugin {
        pub name: String,
        pub priority: i32,
        pub dependencies: Vec<String>,
        pub init_ok: bool,
    }

    impl TestPlugin {
        pub fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                dependencies: vec![],
                init_ok: true,
            }
        }

        pub fn depends_on(mut self, dep: &str) -> Self {
            self.dependencies.push(dep.to_string());
            self
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }
        fn hooks(&self) -> BTreeSet<HookPoint> {
            [HookPoint::PostInstall].into_iter().collect()
        }
        async fn init(&self) -> PackratResult<bool> {
            Ok(self.init_ok)
        }
        async fn handle(&self, _: HookPoint, _: &HookContext) -> PackratResult<HookOutcome> {
            Ok(HookOutcome::Continue)
        }
    }

    fn names(registry: &PluginRegistry) -> Vec<&str> {
        registry.enabled().map(|r| r.name()).collect()
    }

    #[tokio::test]
    async fn orders_by_priority_then_registration() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin::new("low", 5)));
        registry.register(Arc::new(TestPlugin::new("first-ten", 10)));
        registry.register(Arc::new(TestPlugin::new("second-ten", 10)));
        registry.load().await;

        assert_eq!(names(&registry), vec!["first-ten", "second-ten", "low"]);
    }

    #[tokio::test]
    async fn missing_dependency_disables_transitively() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin::new("a", 0).depends_on("ghost")));
        registry.register(Arc::new(TestPlugin::new("b", 0).depends_on("a")));
        registry.register(Arc::new(TestPlugin::new("c", 0)));
        registry.load().await;

        assert_eq!(names(&registry), vec!["c"]);
        assert_eq!(registry.diagnostics().len(), 2);
    }

    #[tokio::test]
    async fn failed_init_disables_dependents() {
        let mut registry = PluginRegistry::new();
        let mut base = TestPlugin::new("base", 0);
        base.init_ok = false;
        registry.register(Arc::new(base));
        registry.register(Arc::new(TestPlugin::new("ext", 0).depends_on("base")));
        registry.load().await;

        assert!(names(&registry).is_empty());
        let ext = registry
            .registrations()
            .iter()
            .find(|r| r.name() == "ext")
            .unwrap();
        assert_eq!(ext.disabled_reason(), Some("dependency base is disabled"));
    }

    #[tokio::test]
    async fn duplicate_names_are_diagnosed() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin::new("dup", 1)));
        registry.register(Arc::new(TestPlugin::new("dup", 9)));
        registry.load().await;

        assert_eq!(registry.registrations().len(), 1);
        assert_eq!(registry.registrations()[0].priority(), 1);
        assert_eq!(registry.diagnostics().len(), 1);
    }
}
