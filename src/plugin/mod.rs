//! Lifecycle plugins
//!
//! Plugins observe and gate install, snapshot and restore operations at a
//! closed set of [`HookPoint`]s. Handlers for one point run strictly one
//! after another in `(priority desc, registration order asc)` order.

pub mod command;
pub mod dispatcher;
pub mod hook;
pub mod registry;
pub mod traits;

pub use command::{CommandPlugin, ManifestLoad, PluginManifest, PluginSpec, PLUGIN_FILE};
pub use dispatcher::{DispatchReport, HookDispatcher};
pub use hook::{HookContext, HookOutcome, HookPoint, PackageContext};
pub use registry::{PluginRegistry, Registration};
pub use traits::Plugin;
