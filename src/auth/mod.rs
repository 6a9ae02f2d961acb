//! Rotating authentication bundle.
//!
//! The bundle (bearer token, cookie set, user agent) is expensive to obtain:
//! the acquirer behind the [`AuthAcquirer`] seam drives an interactive login
//! through a real browser and intercepts the authenticate response. The
//! rotator collapses concurrent first-use misses into one acquisition and
//! re-acquires after a configured number of uses.

pub mod proxy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::proxy::{ProxyConfig, ProxyRotator};
use crate::core::rotator::{CredentialRotator, CredentialSupplier};
use crate::error::AcquireError;

/// One cookie captured at login time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Everything needed to make authenticated requests: bearer token, the
/// cookie set captured alongside it, and the user agent the login session
/// presented. Crosses the browser-automation process boundary as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBundle {
    #[serde(rename = "jwt")]
    pub bearer_token: String,
    pub cookies: Vec<BundleCookie>,
    pub user_agent: String,
}

impl AuthBundle {
    /// A bundle is fully populated or it does not exist: an empty token is
    /// rejected at construction.
    pub fn new(
        bearer_token: impl Into<String>,
        cookies: Vec<BundleCookie>,
        user_agent: impl Into<String>,
    ) -> Result<Self, AcquireError> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(AcquireError::NoToken);
        }
        Ok(Self {
            bearer_token,
            cookies,
            user_agent: user_agent.into(),
        })
    }
}

/// External acquisition procedure (browser automation or a replay request).
/// May take seconds and must time out internally rather than hang; the
/// rotator adds its own cap on top.
#[async_trait]
pub trait AuthAcquirer: Send + Sync {
    async fn acquire(&self, proxy: &ProxyConfig) -> Result<AuthBundle, AcquireError>;
}

/// Supplier that snapshots the current proxy config before each acquisition,
/// keeping the authenticated session proxy-consistent. Reads the proxy via
/// `current()` so auth acquisition never advances proxy rotation counts.
struct ProxyBoundSupplier {
    acquirer: Arc<dyn AuthAcquirer>,
    proxies: Arc<ProxyRotator>,
}

#[async_trait]
impl CredentialSupplier<AuthBundle> for ProxyBoundSupplier {
    async fn supply(&self) -> Result<AuthBundle, AcquireError> {
        let proxy = self.proxies.current().await?;
        let bundle = self.acquirer.acquire(&proxy).await?;
        if bundle.bearer_token.is_empty() {
            return Err(AcquireError::NoToken);
        }
        Ok(bundle)
    }
}

/// [`CredentialRotator`] specialized to authentication bundles.
pub struct AuthRotator {
    inner: CredentialRotator<AuthBundle>,
}

impl AuthRotator {
    /// Default supplier cap; browser logins that outlive this are abandoned.
    pub const DEFAULT_SUPPLIER_TIMEOUT: Duration = Duration::from_secs(45);

    pub fn new(limit: u32, acquirer: Arc<dyn AuthAcquirer>, proxies: Arc<ProxyRotator>) -> Self {
        let supplier = ProxyBoundSupplier { acquirer, proxies };
        Self {
            inner: CredentialRotator::new(limit, supplier)
                .with_supplier_timeout(Self::DEFAULT_SUPPLIER_TIMEOUT),
        }
    }

    pub fn with_supplier_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.with_supplier_timeout(timeout);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn acquire(&self) -> Result<AuthBundle, AcquireError> {
        self.inner.acquire().await
    }

    pub fn supplier_invocations(&self) -> u64 {
        self.inner.supplier_invocations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::proxy::ProxySessionSupplier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn test_proxies(limit: u32) -> Arc<ProxyRotator> {
        ProxyRotator::new(
            limit,
            ProxySessionSupplier::new("acct", "pw").with_endpoint("localhost", 33335),
        )
        .into_shared()
    }

    fn bundle(token: &str) -> AuthBundle {
        AuthBundle {
            bearer_token: token.to_string(),
            cookies: vec![BundleCookie {
                name: "JSESSIONID".into(),
                value: "abc123".into(),
                domain: "portal.example".into(),
            }],
            user_agent: "Mozilla/5.0 (test)".into(),
        }
    }

    /// Acquirer that records the proxies it saw and replays scripted results.
    struct ScriptedAcquirer {
        calls: AtomicU32,
        seen_proxies: Mutex<Vec<String>>,
        results: Mutex<Vec<Result<AuthBundle, AcquireError>>>,
    }

    impl ScriptedAcquirer {
        fn new(results: Vec<Result<AuthBundle, AcquireError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                seen_proxies: Mutex::new(Vec::new()),
                results: Mutex::new(results),
            }
        }
    }

    #[async_trait]
    impl AuthAcquirer for ScriptedAcquirer {
        async fn acquire(&self, proxy: &ProxyConfig) -> Result<AuthBundle, AcquireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_proxies.lock().await.push(proxy.username.clone());
            let mut results = self.results.lock().await;
            if results.is_empty() {
                return Err(AcquireError::Other(anyhow::anyhow!("script exhausted")));
            }
            results.remove(0)
        }
    }

    #[test]
    fn empty_token_is_rejected_at_construction() {
        match AuthBundle::new("", Vec::new(), "ua") {
            Err(AcquireError::NoToken) => {}
            other => panic!("expected NoToken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn acquisition_uses_current_proxy_session() {
        let proxies = test_proxies(100);
        let seeded = proxies.acquire().await.unwrap();

        let acquirer = Arc::new(ScriptedAcquirer::new(vec![Ok(bundle("tok-1"))]));
        let rotator = AuthRotator::new(10, Arc::clone(&acquirer) as Arc<dyn AuthAcquirer>, proxies);

        let got = rotator.acquire().await.unwrap();
        assert_eq!(got.bearer_token, "tok-1");

        let seen = acquirer.seen_proxies.lock().await;
        assert_eq!(seen.as_slice(), &[seeded.username.clone()]);
    }

    #[tokio::test]
    async fn acquirer_failure_surfaces_distinguishably() {
        let acquirer = Arc::new(ScriptedAcquirer::new(vec![Err(AcquireError::NoToken)]));
        let rotator = AuthRotator::new(10, acquirer as Arc<dyn AuthAcquirer>, test_proxies(100));

        match rotator.acquire().await {
            Err(AcquireError::NoToken) => {}
            other => panic!("expected NoToken, got {:?}", other.map(|b| b.bearer_token)),
        }
    }

    #[tokio::test]
    async fn empty_token_from_acquirer_is_never_a_valid_bundle() {
        // An acquirer that sidesteps AuthBundle::new still cannot leak an
        // empty token through the supplier.
        let hollow = AuthBundle {
            bearer_token: String::new(),
            cookies: Vec::new(),
            user_agent: "ua".into(),
        };
        let acquirer = Arc::new(ScriptedAcquirer::new(vec![Ok(hollow)]));
        let rotator = AuthRotator::new(10, acquirer as Arc<dyn AuthAcquirer>, test_proxies(100));

        match rotator.acquire().await {
            Err(AcquireError::NoToken) => {}
            other => panic!("expected NoToken, got {:?}", other.map(|b| b.bearer_token)),
        }
    }

    #[tokio::test]
    async fn bundle_rotates_at_its_own_limit() {
        let acquirer = Arc::new(ScriptedAcquirer::new(vec![
            Ok(bundle("tok-1")),
            Ok(bundle("tok-2")),
        ]));
        let rotator = AuthRotator::new(
            2,
            Arc::clone(&acquirer) as Arc<dyn AuthAcquirer>,
            test_proxies(100),
        );

        // Limit 2: the second acquire reuses the bundle, the third rotates.
        assert_eq!(rotator.acquire().await.unwrap().bearer_token, "tok-1");
        assert_eq!(rotator.acquire().await.unwrap().bearer_token, "tok-1");
        assert_eq!(rotator.acquire().await.unwrap().bearer_token, "tok-2");
        assert_eq!(rotator.supplier_invocations(), 2);
    }

    #[test]
    fn bundle_deserializes_browser_side_json() {
        let raw = r#"{
            "jwt": "eyJhbGciOiJIUzI1NiJ9.e30.sig",
            "cookies": [{"name": "dtCookie", "value": "v_4", "domain": ".example.ca"}],
            "user_agent": "Mozilla/5.0 (X11; Linux x86_64)"
        }"#;
        let bundle: AuthBundle = serde_json::from_str(raw).unwrap();
        assert!(bundle.bearer_token.starts_with("eyJ"));
        assert_eq!(bundle.cookies.len(), 1);
        assert_eq!(bundle.cookies[0].domain, ".example.ca");
    }
}
