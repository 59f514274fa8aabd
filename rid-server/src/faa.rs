//! FAA Remote ID registry client.
//!
//! The registry front-end expects a browser: queries only succeed with a
//! session cookie obtained from the document-listing homepage and
//! browser-like request headers. Transient gateway errors (502/503/504)
//! are retried with exponential backoff.

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;

use rid_core::types::{Result, RidError};

const HOME_URL: &str = "https://uasdoc.faa.gov/listDocs";
const API_URL: &str = "https://uasdoc.faa.gov/api/v1/serialNumbers";

const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0";

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_FACTOR: u64 = 2;

pub struct FaaClient {
    client: reqwest::Client,
    home_url: String,
    api_url: String,
}

impl FaaClient {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(HOME_URL, API_URL)
    }

    /// Client against explicit endpoints. Production uses [`FaaClient::new`];
    /// tests point this at unreachable or local addresses.
    pub fn with_endpoints(home_url: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(FIREFOX_UA));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("client", HeaderValue::from_static("external"));
        if let Ok(referer) = HeaderValue::from_str(home_url) {
            headers.insert(REFERER, referer);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RidError::Registry(e.to_string()))?;

        Ok(FaaClient {
            client,
            home_url: home_url.to_string(),
            api_url: api_url.to_string(),
        })
    }

    /// Refresh the session cookie by loading the homepage.
    pub async fn refresh_cookie(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.home_url)
            .send()
            .await
            .map_err(|e| RidError::Registry(e.to_string()))?;
        debug!("registry homepage: {}", resp.status());
        Ok(())
    }

    /// Look up a Remote ID serial number, retrying gateway errors.
    pub async fn query_serial(&self, serial: &str) -> Result<Value> {
        let params = [
            ("itemsPerPage", "8"),
            ("pageIndex", "0"),
            ("orderBy[0]", "updatedAt"),
            ("orderBy[1]", "DESC"),
            ("findBy", "serialNumber"),
            ("serialNumber", serial),
        ];

        let mut last_err = RidError::Registry("no attempts made".into());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.get(&self.api_url).query(&params).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .map_err(|e| RidError::Registry(e.to_string()));
                    }
                    if !matches!(status.as_u16(), 502 | 503 | 504) {
                        return Err(RidError::Registry(format!(
                            "registry returned {status} for {serial}"
                        )));
                    }
                    last_err = RidError::Registry(format!("registry returned {status}"));
                }
                Err(e) => last_err = RidError::Registry(e.to_string()),
            }

            if attempt < MAX_ATTEMPTS {
                let delay = BACKOFF_FACTOR.pow(attempt);
                warn!("registry query for {serial} failed (attempt {attempt}), retrying in {delay}s");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }
        Err(last_err)
    }
}

/// True when a registry response actually carries documents.
///
/// The registry nests results under `data`; a bare top-level `items`
/// array is tolerated as well.
pub fn has_items(payload: &Value) -> bool {
    let items = match &payload["data"]["items"] {
        Value::Null => &payload["items"],
        nested => nested,
    };
    items.as_array().map(|a| !a.is_empty()).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
