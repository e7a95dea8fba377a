//! Plugin abstraction
//!
//! Provides a trait for lifecycle plugins that can be implemented in-process
//! or backed by shell commands declared in the plugin manifest.

use crate::error::PackratResult;
use crate::plugin::hook::{HookContext, HookOutcome, HookPoint};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Lifecycle plugin interface
///
/// The dispatcher only calls [`handle`](Plugin::handle) for points listed in
/// [`hooks`](Plugin::hooks), and only while the plugin is enabled.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name
    fn name(&self) -> &str;

    /// Plugin version string
    fn version(&self) -> &str;

    /// Higher priority runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Names of plugins that must be present and enabled
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Hook points this plugin handles
    fn hooks(&self) -> BTreeSet<HookPoint>;

    /// One-time setup; `false` disables the plugin
    async fn init(&self) -> PackratResult<bool> {
        Ok(true)
    }

    /// Teardown at the end of the run
    async fn cleanup(&self) -> PackratResult<bool> {
        Ok(true)
    }

    /// Handle one hook invocation
    async fn handle(&self, point: HookPoint, ctx: &HookContext) -> PackratResult<HookOutcome>;
}
