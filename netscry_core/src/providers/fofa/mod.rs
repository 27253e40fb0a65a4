//! Fofa search.
//!
//! The query travels base64-encoded in `qbase64`; results come back as
//! positional arrays in the order of the requested `fields`.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://fofa.info";
const PAGE_SIZE: u64 = 100;

pub struct Fofa {
    base_url: Url,
}

impl Fofa {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Fofa {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    size: u64,
    /// Rows of [host, ip, port] matching the `fields` parameter
    #[serde(default)]
    results: Vec<Vec<String>>,
}

#[async_trait]
impl Provider for Fofa {
    fn name(&self) -> &'static str {
        "fofa"
    }

    fn description(&self) -> &'static str {
        "Fofa cyberspace mapping search (fofa.info)."
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
        let encoded = base64::engine::general_purpose::STANDARD.encode(query);
        let mut url = self.base_url.join("/api/v1/search/all")?;
        url.query_pairs_mut()
            .append_pair("key", credential.secret(0))
            .append_pair("qbase64", &encoded)
            .append_pair("fields", "host,ip,port")
            .append_pair("page", &page.to_string())
            .append_pair("size", &PAGE_SIZE.to_string());
        Ok(RequestSpec::get(url))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "fofa",
                message: e.to_string(),
            })?;

        if response.error {
            let msg = response.errmsg.to_lowercase();
            if msg.contains("limit") || msg.contains("too fast") {
                return Ok(ParsedPage {
                    rate_limited: true,
                    ..Default::default()
                });
            }
            return Err(EngineError::Protocol {
                provider: "fofa",
                message: response.errmsg,
            });
        }

        let records: Vec<AssetRecord> = response
            .results
            .iter()
            .map(|row| {
                let host = row.first().map(String::as_str).unwrap_or_default();
                let ip = row.get(1).map(String::as_str).unwrap_or_default();
                let port = row.get(2).and_then(|p| p.parse::<u16>().ok());

                let mut record = AssetRecord::new("fofa").with_raw(serde_json::json!({
                    "host": host, "ip": ip, "port": row.get(2),
                }));
                if let Some(ip) = super::opt_ip(ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = port {
                    record = record.with_port(port);
                }
                // fofa's host field may carry a scheme or port suffix; keep
                // the bare name
                let bare = host
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .split(':')
                    .next()
                    .unwrap_or_default();
                if !bare.is_empty() && super::opt_ip(bare).is_none() {
                    record = record.with_host(bare);
                }
                record
            })
            .collect();

        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let next_cursor = if !records.is_empty() && page * PAGE_SIZE < response.size {
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
