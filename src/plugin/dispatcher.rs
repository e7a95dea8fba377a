//! Sequential, fault-isolated hook dispatch

use crate::error::{PackratError, PackratResult};
use crate::plugin::hook::{HookContext, HookOutcome, HookPoint};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::traits::Plugin;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

struct Handler {
    plugin: Arc<dyn Plugin>,
    hooks: BTreeSet<HookPoint>,
}

/// What happened during one dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Plugins whose handlers ran, in order
    pub invoked: Vec<String>,
    /// Plugin that vetoed the operation (only at veto-honoring points)
    pub vetoed_by: Option<String>,
    /// Non-gating handler failures
    pub errors: Vec<PackratError>,
}

impl DispatchReport {
    pub fn is_vetoed(&self) -> bool {
        self.vetoed_by.is_some()
    }
}

/// Runs enabled plugins' handlers for a hook point, one after another
///
/// Cheap to clone; install workers share one dispatcher.
#[derive(Clone)]
pub struct HookDispatcher {
    handlers: Arc<Vec<Handler>>,
}

impl HookDispatcher {
    /// Dispatcher with no plugins
    pub fn empty() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Snapshot the enabled plugins of a loaded registry, in order
    pub fn new(registry: &PluginRegistry) -> Self {
        let handlers = registry
            .enabled()
            .map(|r| Handler {
                plugin: Arc::clone(r.plugin()),
                hooks: r.hooks(),
            })
            .collect();
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler for `point` in order
    ///
    /// Returns `Err` only when a handler fails at a gating point.
    pub async fn dispatch(&self, point: HookPoint, ctx: &HookContext) -> PackratResult<DispatchReport> {
        let mut report = DispatchReport::default();

        for handler in self.handlers.iter().filter(|h| h.hooks.contains(&point)) {
            let name = handler.plugin.name().to_string();
            report.invoked.push(name.clone());

            let reason = match invoke(&handler.plugin, point, ctx).await {
                Ok(HookOutcome::Continue) => continue,
                Ok(HookOutcome::Veto) if point.honors_veto() => {
                    debug!("Plugin {} vetoed {}", name, point);
                    report.vetoed_by = Some(name);
                    break;
                }
                Ok(HookOutcome::Veto) => {
                    debug!("Ignoring veto from {} at {}", name, point);
                    continue;
                }
                Err(reason) => reason,
            };

            let err = PackratError::PluginHook {
                plugin: name.clone(),
                hook: point.to_string(),
                reason,
                gating: point.is_gating(),
            };
            warn!("{}", err);

            if point == HookPoint::PluginError {
                continue;
            }
            self.notify_plugin_error(&name, &err, ctx).await;
            if point.is_gating() {
                return Err(err);
            }
            report.errors.push(err);
        }

        Ok(report)
    }

    /// Tell the other plugins that `failed` broke; their failures are only logged
    async fn notify_plugin_error(&self, failed: &str, err: &PackratError, ctx: &HookContext) {
        let mut ctx = ctx.with_error(err);
        ctx.failed_plugin = Some(failed.to_string());

        for handler in self
            .handlers
            .iter()
            .filter(|h| h.plugin.name() != failed && h.hooks.contains(&HookPoint::PluginError))
        {
            if let Err(reason) = invoke(&handler.plugin, HookPoint::PluginError, &ctx).await {
                warn!(
                    "Plugin {} failed on {}: {}",
                    handler.plugin.name(),
                    HookPoint::PluginError,
                    reason
                );
            }
        }
    }

    /// Call `cleanup` on every plugin in order
    pub async fn shutdown(&self) {
        for handler in self.handlers.iter() {
            match AssertUnwindSafe(handler.plugin.cleanup()).catch_unwind().await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => warn!("Plugin {} reported a failed cleanup", handler.plugin.name()),
                Ok(Err(e)) => warn!("Cleanup of plugin {} failed: {}", handler.plugin.name(), e),
                Err(panic) => warn!(
                    "Cleanup of plugin {} panicked: {}",
                    handler.plugin.name(),
                    panic_message(panic.as_ref())
                ),
            }
        }
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::empty()
    }
}

/// Run one handler, turning errors and panics into a reason string
async fn invoke(plugin: &Arc<dyn Plugin>, point: HookPoint, ctx: &HookContext) -> Result<HookOutcome, String> {
    match AssertUnwindSafe(plugin.handle(point, ctx)).catch_unwind().await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("handler panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
