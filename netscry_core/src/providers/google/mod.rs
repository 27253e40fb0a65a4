//! Google Custom Search.
//!
//! The only two-secret provider: an API key plus the search-engine
//! identifier (`cx`). Results are web links; the canonical record is the
//! link's host and (implied) port.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
// Custom Search caps start at 100 regardless of result count
const MAX_START: u64 = 100;

pub struct Google {
    base_url: Url,
}

impl Google {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Google {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    queries: Queries,
}

#[derive(Debug, Deserialize, Default)]
struct Queries {
    #[serde(default, rename = "nextPage")]
    next_page: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "startIndex")]
    start_index: u64,
}

#[derive(Debug, Deserialize)]
struct Item {
    link: String,
}

#[async_trait]
impl Provider for Google {
    fn name(&self) -> &'static str {
        "google"
    }

    fn description(&self) -> &'static str {
        "Google Custom Search (googleapis.com/customsearch)."
    }

    fn credential_fields(&self) -> &'static [&'static str] {
        &["api_key", "engine_id"]
    }

    fn build_request(
        &self,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<RequestSpec> {
        let start = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let mut url = self.base_url.join("/customsearch/v1")?;
        url.query_pairs_mut()
            .append_pair("key", credential.secret(0))
            .append_pair("cx", credential.secret(1))
            .append_pair("q", query)
            .append_pair("start", &start.to_string());
        Ok(RequestSpec::get(url))
    }

    fn parse_page(&self, body: &str, _cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "google",
                message: e.to_string(),
            })?;

        let records: Vec<AssetRecord> = response
            .items
            .iter()
            .filter_map(|item| {
                let link = Url::parse(&item.link).ok()?;
                let host = link.host_str()?.to_string();
                let mut record = AssetRecord::new("google")
                    .with_raw(serde_json::json!({ "link": item.link }));
                record = match super::opt_ip(&host) {
                    Some(ip) => record.with_ip(ip),
                    None => record.with_host(host),
                };
                if let Some(port) = link.port_or_known_default() {
                    record = record.with_port(port);
                }
                Some(record)
            })
            .collect();

        let next_cursor = response
            .queries
            .next_page
            .first()
            .map(|p| p.start_index)
            .filter(|&start| start <= MAX_START)
            .map(Cursor::Offset);

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

    fn cred() -> Credential {
        Credential::new(vec!["gkey".into(), "gcx".into()])
    }

    #[test]
    fn both_secrets_appear_in_query() {
        let spec = Google::default()
            .build_request("site:*.hackerone.com", &cred(), None)
            .unwrap();
        let query = spec.url.query().unwrap();
        assert!(query.contains("key=gkey"));
        assert!(query.contains("cx=gcx"));
        assert!(query.contains("start=1"));
    }

    #[test]
    fn links_map_to_host_and_default_port() {
        let body = json!({
            "items": [
                {"link": "https://bounty.hackerone.com/reports/1"},
                {"link": "http://198.51.100.4:8080/login"}
            ],
            "queries": {"nextPage": [{"startIndex": 11}]}
        })
        .to_string();

        let page = Google::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].host.as_deref(), Some("bounty.hackerone.com"));
        assert_eq!(page.records[0].port, Some(443));
        assert_eq!(page.records[1].dedup_key(), "198.51.100.4:8080");
        assert_eq!(page.next_cursor, Some(Cursor::Offset(11)));
    }

    #[test]
    fn unparseable_links_are_skipped() {
        let body = json!({"items": [{"link": "::not a url::"}]}).to_string();
        let page = Google::default().parse_page(&body, None).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn start_beyond_api_cap_exhausts() {
        let body = json!({
            "items": [{"link": "https://example.com/"}],
            "queries": {"nextPage": [{"startIndex": 101}]}
        })
        .to_string();
        let page = Google::default().parse_page(&body, None).unwrap();
        assert!(page.next_cursor.is_none());
    }
}
