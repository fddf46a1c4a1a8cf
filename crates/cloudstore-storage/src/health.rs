//! Provider health checks

use crate::blob::BlobStore;
use crate::ranked::RankedBlobStore;

/// Outcome of probing one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealth {
    pub provider: String,
    pub error: Option<String>,
}

impl ProviderHealth {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Probe every provider in rank order. Never fails; errors are reported
/// per provider.
pub async fn check_health(stores: &RankedBlobStore) -> Vec<ProviderHealth> {
    let mut report = Vec::new();
    for store in stores.stores() {
        let error = match store.health().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(provider = store.name(), error = %e, "provider unhealthy");
                Some(e.to_string())
            }
        };
        report.push(ProviderHealth {
            provider: store.name().to_string(),
            error,
        });
    }
    report
}
