//! Provider factory
//!
//! The only place that branches on the configured provider type.

use crate::cloud::azure::AzureProvider;
use crate::cloud::gcp::GcpProvider;
use crate::cloud::provider::CloudProvider;
use crate::cloud::s3::S3Provider;
use crate::config::{CloudConfig, CloudProviderKind};
use crate::error::{PackratError, PackratResult};
use std::sync::Arc;

/// Create the object store backend selected by `config.provider`
///
/// # Returns
/// * `Ok(Arc<dyn CloudProvider>)` - The provider implementation
/// * `Err` - If no bucket is configured
pub fn create_provider(config: &CloudConfig) -> PackratResult<Arc<dyn CloudProvider>> {
    if config.bucket.trim().is_empty() {
        return Err(PackratError::CloudUnavailable {
            provider: config.provider.to_string(),
            reason: "no bucket configured (set cloud.bucket or --cloud-bucket)".to_string(),
        });
    }

    Ok(match config.provider {
        CloudProviderKind::S3 => Arc::new(S3Provider::new(config)),
        CloudProviderKind::Azure => Arc::new(AzureProvider::new(config)),
        CloudProviderKind::Gcp => Arc::new(GcpProvider::new(config)),
    })
}
