//! Onyphe search (API v2). Bearer-style `apikey` auth header, numeric page
//! cursor bounded by the response's `max_page`.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.onyphe.io";

pub struct Onyphe {
    base_url: Url,
}

impl Onyphe {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Onyphe {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    results: Vec<Entry>,
    #[serde(default)]
    max_page: u64,
}

#[derive(Debug, Deserialize)]
struct Entry {
    ip: Option<String>,
    /// Onyphe renders ports as strings
    port: Option<String>,
    #[serde(default)]
    hostname: Vec<String>,
}

#[async_trait]
impl Provider for Onyphe {
    fn name(&self) -> &'static str {
        "onyphe"
    }

    fn description(&self) -> &'static str {
        "Onyphe cyber-defense search (onyphe.io, API v2)."
    }

    fn credential_fields(&self) -> &'static [&'static str] {
        &["api_key"]
    }

    fn build_request(
        &self,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<RequestSpec> {
        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let mut url = self.base_url.join("/api/v2/search/")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &page.to_string());
        Ok(RequestSpec::get(url)
            .with_header("Authorization", format!("apikey {}", credential.secret(0)))
            .with_header("Content-Type", "application/json"))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "onyphe",
                message: e.to_string(),
            })?;

        if response.error != 0 {
            let text = response.text.to_lowercase();
            if text.contains("rate") {
                return Ok(ParsedPage {
                    rate_limited: true,
                    ..Default::default()
                });
            }
            return Err(EngineError::Protocol {
                provider: "onyphe",
                message: format!("error {}: {}", response.error, response.text),
            });
        }

        let records: Vec<AssetRecord> = response
            .results
            .iter()
            .map(|e| {
                let mut record = AssetRecord::new("onyphe").with_raw(serde_json::json!({
                    "ip": e.ip, "port": e.port, "hostname": e.hostname,
                }));
                if let Some(ip) = e.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = e.port.as_deref().and_then(|p| p.parse::<u16>().ok()) {
                    record = record.with_port(port);
                }
                if let Some(host) = e.hostname.first().filter(|h| !h.is_empty()) {
                    record = record.with_host(host.clone());
                }
                record
            })
            .collect();

        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let next_cursor = if !records.is_empty() && page < response.max_page {
            Some(Cursor::Offset(page + 1))
        } else {
            None
        };

        Ok(ParsedPage {
            records,
            next_cursor,
            rate_limited: false,
        })
    }
}
