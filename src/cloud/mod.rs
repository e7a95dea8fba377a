//! Team cloud cache
//!
//! A bucket shared across machines, partitioned by team and project prefix.
//! The store is eventually consistent: a miss right after another machine's
//! upload is normal and simply falls through to the registry.

pub mod azure;
pub mod factory;
pub mod gcp;
pub mod provider;
pub mod s3;
pub mod sync;

pub use factory::create_provider;
pub use provider::CloudProvider;
pub use sync::{CloudFetchOutcome, CloudObject, CloudSync, ObjectKey, SyncState};
