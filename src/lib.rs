pub mod auth;
pub mod core;
pub mod error;
pub mod http;
pub mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::auth::proxy::{ProxyConfig, ProxyRotator, ProxySessionSupplier};
pub use crate::auth::{AuthAcquirer, AuthBundle, AuthRotator, BundleCookie};
pub use crate::core::fetcher::{BoundedFetcher, FetchRecord};
pub use crate::core::reconcile::{reconcile, RecordId};
pub use crate::core::report::{HarvestAggregator, HarvestReport};
pub use crate::core::rotator::{CredentialRotator, CredentialSupplier, FnSupplier};
pub use crate::error::{AcquireError, FetchError, FetchErrorKind};
pub use crate::http::client::{DetailTransport, PortalClient};
pub use crate::http::{listing_ids, ListingRequest, PortalEndpoints};
pub use crate::store::{MemoryStore, RecordStore};

/// Shared harvest configuration consumed by the rotators and the fetcher.
///
/// Plain values only: the host scheduler owns env/file loading and hands a
/// finished config to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestConfig {
    /// Detail fetches served by one proxy session before rotation.
    pub proxy_rotation_limit: u32,
    /// Detail fetches served by one auth bundle before re-acquisition.
    pub auth_rotation_limit: u32,
    /// Upper bound on in-flight detail fetches.
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    /// Post-success pacing interval, drawn uniformly from [min, max].
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Hard cap on a single credential-supplier invocation.
    pub supplier_timeout_secs: u64,
    /// Attempts per identifier within one run. 1 means drop-and-log.
    pub max_attempts: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            proxy_rotation_limit: 50,
            auth_rotation_limit: 100,
            concurrency: 10,
            request_timeout_secs: 30,
            jitter_min_ms: 500,
            jitter_max_ms: 2000,
            supplier_timeout_secs: 45,
            max_attempts: 1,
        }
    }
}

impl HarvestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn supplier_timeout(&self) -> Duration {
        Duration::from_secs(self.supplier_timeout_secs)
    }

    /// Jitter bounds as durations, min never exceeding max.
    pub fn jitter_range(&self) -> (Duration, Duration) {
        let lo = self.jitter_min_ms.min(self.jitter_max_ms);
        let hi = self.jitter_min_ms.max(self.jitter_max_ms);
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }
}
