//! Local content-addressed package cache
//!
//! Artifacts are keyed by package fingerprint. Same fingerprint means same
//! bytes, so entries are immutable once published and concurrent installs
//! on one machine share the store without any lock.
//!
//! # Entry States
//!
//! | State | On disk | Visible to `get` |
//! |-------|---------|------------------|
//! | Staging | `<key>.tgz.tmp-<uuid>` | no |
//! | Published | `<key>.tgz` + `<key>.json` | yes |
//! | Evicted | nothing | no |

pub mod entry;
pub mod store;

pub use entry::{format_bytes, CacheEntry, CacheStats, PruneSummary};
pub use store::CacheStore;
