//! ZoomEye host search. API key in a header, numeric page cursor.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.zoomeye.org";
const PAGE_SIZE: u64 = 20;

pub struct ZoomEye {
    base_url: Url,
}

impl ZoomEye {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for ZoomEye {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<Match>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Match {
    ip: Option<String>,
    #[serde(default)]
    portinfo: Option<PortInfo>,
    #[serde(default)]
    rdns: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortInfo {
    port: u16,
}

#[async_trait]
impl Provider for ZoomEye {
    fn name(&self) -> &'static str {
        "zoomeye"
    }

    fn description(&self) -> &'static str {
        "ZoomEye cyberspace search (api.zoomeye.org)."
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
        let mut url = self.base_url.join("/host/search")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("page", &page.to_string());
        Ok(RequestSpec::get(url).with_header("API-KEY", credential.secret(0).to_string()))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "zoomeye",
                message: e.to_string(),
            })?;

        let records: Vec<AssetRecord> = response
            .matches
            .iter()
            .map(|m| {
                let mut record = AssetRecord::new("zoomeye").with_raw(serde_json::json!({
                    "ip": m.ip,
                    "port": m.portinfo.as_ref().map(|p| p.port),
                    "rdns": m.rdns,
                }));
                if let Some(ip) = m.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(info) = &m.portinfo {
                    record = record.with_port(info.port);
                }
                if let Some(rdns) = m.rdns.as_deref().filter(|s| !s.is_empty()) {
                    record = record.with_host(rdns);
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
    fn api_key_travels_as_header() {
        let spec = ZoomEye::default()
            .build_request("app:\"Atlassian JIRA\"", &Credential::new(vec!["zk".into()]), None)
            .unwrap();
        assert!(spec.headers.iter().any(|(k, v)| *k == "API-KEY" && v == "zk"));
        assert!(!spec.url.as_str().contains("zk"));
    }

    #[test]
    fn parses_portinfo_matches() {
        let body = json!({
            "matches": [
                {"ip": "203.0.113.7", "portinfo": {"port": 8080}, "rdns": "jira.example.org"}
            ],
            "total": 1
        })
        .to_string();
        let page = ZoomEye::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].dedup_key(), "203.0.113.7:8080");
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn paginates_until_total_consumed() {
        let matches: Vec<_> = (0..20)
            .map(|i| json!({"ip": format!("203.0.113.{i}"), "portinfo": {"port": 80}}))
            .collect();
        let body = json!({"matches": matches, "total": 45}).to_string();
        let page = ZoomEye::default()
            .parse_page(&body, Some(&Cursor::Offset(2)))
            .unwrap();
        assert_eq!(page.next_cursor, Some(Cursor::Offset(3)));
    }
}
