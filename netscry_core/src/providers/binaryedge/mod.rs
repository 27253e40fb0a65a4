//! BinaryEdge query search. Header key, 1-based page cursor.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.binaryedge.io";
const PAGE_SIZE: u64 = 20;

pub struct BinaryEdge {
    base_url: Url,
}

impl BinaryEdge {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for BinaryEdge {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Event {
    target: Target,
}

#[derive(Debug, Deserialize)]
struct Target {
    ip: Option<String>,
    port: Option<u16>,
}

#[async_trait]
impl Provider for BinaryEdge {
    fn name(&self) -> &'static str {
        "binaryedge"
    }

    fn description(&self) -> &'static str {
        "BinaryEdge internet scan search (api.binaryedge.io)."
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
        let mut url = self.base_url.join("/v2/query/search")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("page", &page.to_string());
        Ok(RequestSpec::get(url).with_header("X-Key", credential.secret(0).to_string()))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "binaryedge",
                message: e.to_string(),
            })?;

        let records: Vec<AssetRecord> = response
            .events
            .iter()
            .map(|e| {
                let mut record = AssetRecord::new("binaryedge").with_raw(serde_json::json!({
                    "ip": e.target.ip, "port": e.target.port,
                }));
                if let Some(ip) = e.target.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = e.target.port {
                    record = record.with_port(port);
                }
                record
            })
            .collect();

        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let next_cursor = if !records.is_empty() && page * PAGE_SIZE < response.total {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_header_and_page_param() {
        let spec = BinaryEdge::default()
            .build_request("1.1.1.1", &Credential::new(vec!["bk".into()]), Some(&Cursor::Offset(2)))
            .unwrap();
        assert!(spec.headers.iter().any(|(k, v)| *k == "X-Key" && v == "bk"));
        assert!(spec.url.query().unwrap().contains("page=2"));
    }

    #[test]
    fn events_map_to_ip_port_records() {
        let body = json!({
            "events": [{"target": {"ip": "1.1.1.1", "port": 53}}],
            "total": 1
        })
        .to_string();
        let page = BinaryEdge::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].dedup_key(), "1.1.1.1:53");
        assert!(page.next_cursor.is_none());
    }
}
