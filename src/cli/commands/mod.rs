//! CLI command implementations

pub mod analyze;
pub mod clean;
pub mod completions;
pub mod config;
pub mod install;
pub mod plugin;
pub mod restore;
pub mod snapshot;
pub mod sync;

pub use analyze::execute as analyze;
pub use clean::{clean_modules, clean_snapshot, execute as clean};
pub use completions::execute as completions;
pub use config::execute as config;
pub use install::execute as install;
pub use plugin::execute as plugin;
pub use restore::execute as restore;
pub use snapshot::execute as snapshot;
pub use sync::execute as sync;

use crate::cloud::CloudSync;
use crate::config::Config;
use crate::plugin::{HookContext, HookDispatcher, PluginManifest, PluginRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Load the plugin manifest and build a dispatcher
///
/// A broken manifest disables plugins for this run instead of failing it.
pub(crate) async fn load_hooks(config: &Config) -> HookDispatcher {
    let manifest = PluginManifest::new(config.plugins.manifest_path());
    let mut registry = match PluginRegistry::from_manifest(&manifest).await {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Plugins disabled: {}", e);
            return HookDispatcher::empty();
        }
    };
    registry.load().await;
    debug!("{} plugins enabled", registry.enabled().count());
    HookDispatcher::new(&registry)
}

/// Cloud cache handle, or `None` when disabled or unusable
pub(crate) fn open_cloud(config: &Config) -> Option<Arc<CloudSync>> {
    match CloudSync::from_config(&config.cloud) {
        Ok(sync) => sync.map(Arc::new),
        Err(e) => {
            warn!("Cloud cache disabled: {}", e);
            None
        }
    }
}

/// Hook context for project-level commands
pub(crate) fn project_context(config: &Config, project: &Path) -> HookContext {
    HookContext::project(
        project.to_path_buf(),
        project.join(&config.install.modules_dir),
    )
    .with_flags(config.cache.enabled, config.cloud.enabled)
}
