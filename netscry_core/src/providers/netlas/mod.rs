//! Netlas responses search. Header key, numeric start offset.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://app.netlas.io";
const PAGE_SIZE: u64 = 20;

pub struct Netlas {
    base_url: Url,
}

impl Netlas {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Netlas {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    data: ItemData,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    ip: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    host: Option<String>,
}

#[async_trait]
impl Provider for Netlas {
    fn name(&self) -> &'static str {
        "netlas"
    }

    fn description(&self) -> &'static str {
        "Netlas internet scan search (app.netlas.io)."
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
        let start = cursor.and_then(Cursor::as_offset).unwrap_or(0);
        let mut url = self.base_url.join("/api/responses/")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("start", &start.to_string());
        Ok(RequestSpec::get(url).with_header("X-API-Key", credential.secret(0).to_string()))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "netlas",
                message: e.to_string(),
            })?;

        let records: Vec<AssetRecord> = response
            .items
            .iter()
            .map(|item| {
                let mut record = AssetRecord::new("netlas").with_raw(serde_json::json!({
                    "ip": item.data.ip, "port": item.data.port, "host": item.data.host,
                }));
                if let Some(ip) = item.data.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = item.data.port {
                    record = record.with_port(port);
                }
                if let Some(host) = item.data.host.as_deref().filter(|h| !h.is_empty()) {
                    record = record.with_host(host);
                }
                record
            })
            .collect();

        // netlas pages are fixed-size; a short page means the stream dried up
        let start = cursor.and_then(Cursor::as_offset).unwrap_or(0);
        let next_cursor = if records.len() as u64 >= PAGE_SIZE {
            Some(Cursor::Offset(start + records.len() as u64))
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_in_header_start_in_query() {
        let spec = Netlas::default()
            .build_request("Grafana", &Credential::new(vec!["nk".into()]), Some(&Cursor::Offset(40)))
            .unwrap();
        assert!(spec.headers.iter().any(|(k, v)| *k == "X-API-Key" && v == "nk"));
        assert!(spec.url.query().unwrap().contains("start=40"));
    }

    #[test]
    fn short_page_exhausts() {
        let body = json!({
            "items": [
                {"data": {"ip": "192.0.2.10", "port": 443, "host": "grafana.test"}}
            ]
        })
        .to_string();
        let page = Netlas::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn full_page_continues_from_consumed_offset() {
        let items: Vec<_> = (0..20)
            .map(|i| json!({"data": {"ip": format!("192.0.2.{i}"), "port": 80}}))
            .collect();
        let body = json!({ "items": items }).to_string();
        let page = Netlas::default()
            .parse_page(&body, Some(&Cursor::Offset(20)))
            .unwrap();
        assert_eq!(page.next_cursor, Some(Cursor::Offset(40)));
    }
}
