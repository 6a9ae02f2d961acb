pub mod client;

pub use client::{DetailTransport, PortalClient};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONNECTION,
    CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthBundle;
use crate::core::reconcile::RecordId;
use crate::error::AcquireError;

pub const DEFAULT_PORTAL_BASE: &str = "https://procurement-portal.novascotia.ca";

/// Escape everything outside the unreserved set, so identifiers with spaces,
/// slashes or ampersands survive as a single query value.
const STRICT_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Upstream API locations, configurable for test doubles and mirrors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalEndpoints {
    /// Origin the portal is served from, no trailing slash.
    pub base: String,
    pub tenders_path: String,
}

impl Default for PortalEndpoints {
    fn default() -> Self {
        Self {
            base: DEFAULT_PORTAL_BASE.to_string(),
            tenders_path: "/procurementui/tenders".to_string(),
        }
    }
}

impl PortalEndpoints {
    /// Detail endpoint for one record, identifier escaped into the query.
    pub fn detail_url(&self, id: &RecordId) -> String {
        format!(
            "{}{}?tenderId={}",
            self.base,
            self.tenders_path,
            utf8_percent_encode(id.as_str(), STRICT_QUERY)
        )
    }

    pub fn origin(&self) -> &str {
        &self.base
    }

    pub fn referer(&self) -> String {
        format!("{}/tenders", self.base)
    }
}

/// One page of the upstream listing, with the status filter the portal
/// expects in the POST body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRequest {
    pub page: u32,
    pub records: u32,
    pub status: String,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            page: 1,
            records: 10_000,
            status: "AWARDED".to_string(),
        }
    }
}

impl ListingRequest {
    pub fn url(&self, endpoints: &PortalEndpoints) -> String {
        format!(
            "{}{}?page={}&numberOfRecords={}&sortType=POSTED_DATE_DESC&keyword=",
            endpoints.base, endpoints.tenders_path, self.page, self.records
        )
    }

    pub fn body(&self) -> Value {
        json!({
            "filters": [{"key": "tenderStatus", "values": [self.status]}]
        })
    }
}

/// Pulls the record identifiers out of a listing response
/// (`tenderDataList[].tenderId`). Entries without an id are skipped.
pub fn listing_ids(listing: &Value) -> Vec<RecordId> {
    listing
        .get("tenderDataList")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("tenderId").and_then(Value::as_str))
                .map(RecordId::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Browser-mimicking header set the portal expects on every API call, built
/// from the bundle captured at login.
pub fn portal_headers(
    endpoints: &PortalEndpoints,
    auth: &AuthBundle,
) -> Result<HeaderMap, AcquireError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(
        AUTHORIZATION,
        header_value(&format!("Bearer {}", auth.bearer_token))?,
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(ORIGIN, header_value(endpoints.origin())?);
    headers.insert(REFERER, header_value(&endpoints.referer())?);
    headers.insert(USER_AGENT, header_value(&auth.user_agent)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn header_value(raw: &str) -> Result<HeaderValue, AcquireError> {
    HeaderValue::from_str(raw)
        .map_err(|e| AcquireError::Other(anyhow::anyhow!("malformed header value: {}", e)))
}
