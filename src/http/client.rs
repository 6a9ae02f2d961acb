//! reqwest-backed portal transport.
//!
//! Proxy and cookie jar are per-credential state, so a client is built per
//! (proxy session, auth bundle) pairing rather than shared across the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::cookie::Jar;
use reqwest::{Client, Proxy};
use serde_json::{json, Value};
use url::Url;

use crate::auth::proxy::ProxyConfig;
use crate::auth::AuthBundle;
use crate::core::reconcile::RecordId;
use crate::error::FetchError;
use crate::http::{portal_headers, ListingRequest, PortalEndpoints};

/// One detail fetch through the current credentials. The seam the fetcher
/// tests stand behind with scripted responses.
#[async_trait]
pub trait DetailTransport: Send + Sync {
    async fn fetch_detail(
        &self,
        id: &RecordId,
        proxy: &ProxyConfig,
        auth: &AuthBundle,
    ) -> Result<Value, FetchError>;
}

pub struct PortalClient {
    endpoints: PortalEndpoints,
    timeout: Duration,
}

impl PortalClient {
    pub fn new(endpoints: PortalEndpoints, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }

    pub fn endpoints(&self) -> &PortalEndpoints {
        &self.endpoints
    }

    /// Client carrying the bundle's cookie jar, the portal header set, and
    /// optionally the proxy session.
    fn build_client(
        &self,
        proxy: Option<&ProxyConfig>,
        auth: &AuthBundle,
    ) -> Result<Client, FetchError> {
        let base: Url = self
            .endpoints
            .base
            .parse()
            .map_err(|e: url::ParseError| FetchError::Transport {
                url: self.endpoints.base.clone(),
                message: e.to_string(),
            })?;

        let jar = Jar::default();
        for cookie in &auth.cookies {
            jar.add_cookie_str(
                &format!(
                    "{}={}; Domain={}; Path=/",
                    cookie.name, cookie.value, cookie.domain
                ),
                &base,
            );
        }

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .default_headers(portal_headers(&self.endpoints, auth)?)
            .cookie_provider(Arc::new(jar));

        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy.url()).map_err(|e| FetchError::Transport {
                url: self.endpoints.base.clone(),
                message: format!("invalid proxy config: {}", e),
            })?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(|e| FetchError::Transport {
            url: self.endpoints.base.clone(),
            message: format!("client build failed: {}", e),
        })
    }

    /// Listing POST with the status filter body. Runs without the proxy,
    /// matching how the list stage authenticates directly.
    pub async fn list(
        &self,
        auth: &AuthBundle,
        request: &ListingRequest,
    ) -> Result<Value, FetchError> {
        let url = request.url(&self.endpoints);
        let client = self.build_client(None, auth)?;

        let response = client
            .post(&url)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        debug!("listing returned {} for {}", status.as_u16(), url);
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))
    }
}

#[async_trait]
impl DetailTransport for PortalClient {
    async fn fetch_detail(
        &self,
        id: &RecordId,
        proxy: &ProxyConfig,
        auth: &AuthBundle,
    ) -> Result<Value, FetchError> {
        let url = self.endpoints.detail_url(id);
        let client = self.build_client(Some(proxy), auth)?;

        // The detail endpoint wants a POST with an empty JSON object.
        let response = client
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        debug!("received {} for {}", status.as_u16(), url);
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BundleCookie;

    fn bundle() -> AuthBundle {
        AuthBundle {
            bearer_token: "tok".into(),
            cookies: vec![BundleCookie {
                name: "dtCookie".into(),
                value: "v4".into(),
                domain: ".novascotia.ca".into(),
            }],
            user_agent: "Mozilla/5.0 (test)".into(),
        }
    }

    #[test]
    fn builds_client_with_proxy_and_cookie_jar() {
        let client = PortalClient::new(
            PortalEndpoints::default(),
            crate::HarvestConfig::default().request_timeout(),
        );
        let proxy = ProxyConfig {
            server: "198.51.100.7:33335".into(),
            username: "acct-session-1".into(),
            password: "pw".into(),
        };
        assert!(client.build_client(Some(&proxy), &bundle()).is_ok());
        assert!(client.build_client(None, &bundle()).is_ok());
    }

    #[test]
    fn unparseable_base_is_a_transport_error() {
        let endpoints = PortalEndpoints {
            base: "not a url".into(),
            ..Default::default()
        };
        let client = PortalClient::new(endpoints, Duration::from_secs(5));
        match client.build_client(None, &bundle()) {
            Err(FetchError::Transport { .. }) => {}
            other => panic!("expected Transport, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn malformed_bundle_is_a_credential_error() {
        let client = PortalClient::new(PortalEndpoints::default(), Duration::from_secs(5));
        let mut bad = bundle();
        bad.user_agent = "ua\nwith newline".into();
        match client.build_client(None, &bad) {
            Err(FetchError::Credential(_)) => {}
            other => panic!("expected Credential, got {:?}", other.map(|_| ())),
        }
    }
}
