//! CriminalIP banner search. Header key, numeric offset cursor.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.criminalip.io";
const PAGE_SIZE: u64 = 10;

pub struct CriminalIp {
    base_url: Url,
}

impl CriminalIp {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for CriminalIp {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Data,
}

#[derive(Debug, Deserialize, Default)]
struct Data {
    #[serde(default)]
    result: Vec<Banner>,
}

#[derive(Debug, Deserialize)]
struct Banner {
    ip_address: Option<String>,
    open_port_no: Option<u16>,
    #[serde(default)]
    domain: Option<String>,
}

#[async_trait]
impl Provider for CriminalIp {
    fn name(&self) -> &'static str {
        "criminalip"
    }

    fn description(&self) -> &'static str {
        "CriminalIP banner search (api.criminalip.io)."
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
        let offset = cursor.and_then(Cursor::as_offset).unwrap_or(0);
        let mut url = self.base_url.join("/v1/banner/search")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("offset", &offset.to_string());
        Ok(RequestSpec::get(url).with_header("x-api-key", credential.secret(0).to_string()))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "criminalip",
                message: e.to_string(),
            })?;

        if response.status != 200 {
            return Err(EngineError::Protocol {
                provider: "criminalip",
                message: format!("status {}: {}", response.status, response.message),
            });
        }

        let records: Vec<AssetRecord> = response
            .data
            .result
            .iter()
            .map(|b| {
                let mut record = AssetRecord::new("criminalip").with_raw(serde_json::json!({
                    "ip_address": b.ip_address,
                    "open_port_no": b.open_port_no,
                    "domain": b.domain,
                }));
                if let Some(ip) = b.ip_address.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = b.open_port_no {
                    record = record.with_port(port);
                }
                if let Some(domain) = b.domain.as_deref().filter(|d| !d.is_empty()) {
                    record = record.with_host(domain);
                }
                record
            })
            .collect();

        let offset = cursor.and_then(Cursor::as_offset).unwrap_or(0);
        let next_cursor = if records.len() as u64 >= PAGE_SIZE {
            Some(Cursor::Offset(offset + records.len() as u64))
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
