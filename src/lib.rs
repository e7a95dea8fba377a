//! Packrat - fast, deterministic JavaScript dependency installs
//!
//! Serves packages from a content-addressed local cache, an optional team
//! cloud cache and whole-tree snapshots, with lifecycle plugins and a
//! package-manager fallback.

pub mod cache;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod installer;
pub mod lockfile;
pub mod plugin;
pub mod registry;
pub mod snapshot;
pub mod ui;

pub use error::{PackratError, PackratResult};
