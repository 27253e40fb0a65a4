//! Shodan host search.
//!
//! Key goes in the query string, pagination is a 1-based page number,
//! 100 results per page.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";
const PAGE_SIZE: u64 = 100;

pub struct Shodan {
    base_url: Url,
}

impl Shodan {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Shodan {
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
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Match {
    ip_str: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    hostnames: Vec<String>,
}

#[async_trait]
impl Provider for Shodan {
    fn name(&self) -> &'static str {
        "shodan"
    }

    fn description(&self) -> &'static str {
        "Shodan internet device search (api.shodan.io)."
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
        let mut url = self.base_url.join("/shodan/host/search")?;
        url.query_pairs_mut()
            .append_pair("key", credential.secret(0))
            .append_pair("query", query)
            .append_pair("page", &page.to_string());
        Ok(RequestSpec::get(url))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "shodan",
                message: e.to_string(),
            })?;

        if let Some(error) = &response.error {
            let rate_limited = error.to_lowercase().contains("rate limit");
            if !rate_limited {
                return Err(EngineError::Protocol {
                    provider: "shodan",
                    message: error.clone(),
                });
            }
            return Ok(ParsedPage {
                rate_limited: true,
                ..Default::default()
            });
        }

        let records: Vec<AssetRecord> = response
            .matches
            .iter()
            .map(|m| {
                let mut record = AssetRecord::new("shodan");
                if let Some(ip) = m.ip_str.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = m.port {
                    record = record.with_port(port);
                }
                if let Some(host) = m.hostnames.first() {
                    record = record.with_host(host.clone());
                }
                record.with_raw(serde_json::json!({
                    "ip_str": m.ip_str,
                    "port": m.port,
                    "hostnames": m.hostnames,
                }))
            })
            .collect();

        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let seen = page * PAGE_SIZE;
        let next_cursor = if !records.is_empty() && seen < response.total {
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
    fn builds_keyed_page_request() {
        let shodan = Shodan::default();
        let cred = Credential::new(vec!["tok".into()]);
        let spec = shodan
            .build_request("title:\"Grafana\"", &cred, Some(&Cursor::Offset(3)))
            .unwrap();
        assert_eq!(spec.url.path(), "/shodan/host/search");
        let query = spec.url.query().unwrap();
        assert!(query.contains("key=tok"));
        assert!(query.contains("page=3"));
    }

    #[test]
    fn build_request_is_deterministic() {
        let shodan = Shodan::default();
        let cred = Credential::new(vec!["tok".into()]);
        let a = shodan.build_request("nginx", &cred, None).unwrap();
        let b = shodan.build_request("nginx", &cred, None).unwrap();
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn parses_matches_into_records() {
        let body = json!({
            "matches": [
                {"ip_str": "93.184.216.34", "port": 443, "hostnames": ["example.com"]},
                {"ip_str": "10.0.0.2", "port": 80, "hostnames": []}
            ],
            "total": 2
        })
        .to_string();

        let page = Shodan::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].dedup_key(), "93.184.216.34:443");
        assert_eq!(page.records[0].host.as_deref(), Some("example.com"));
        assert!(page.next_cursor.is_none(), "total reached, exhausted");
    }

    #[test]
    fn advances_page_while_more_results_remain() {
        let matches: Vec<_> = (0..100)
            .map(|i| json!({"ip_str": format!("10.0.0.{}", i), "port": 80, "hostnames": []}))
            .collect();
        let body = json!({"matches": matches, "total": 250}).to_string();

        let page = Shodan::default().parse_page(&body, None).unwrap();
        assert_eq!(page.next_cursor, Some(Cursor::Offset(2)));

        let page3 = Shodan::default()
            .parse_page(&body, Some(&Cursor::Offset(3)))
            .unwrap();
        assert!(page3.next_cursor.is_none(), "page 3 covers the remainder");
    }

    #[test]
    fn rate_limit_error_is_flagged_not_fatal() {
        let body = json!({"error": "Rate limit exceeded"}).to_string();
        let page = Shodan::default().parse_page(&body, None).unwrap();
        assert!(page.rate_limited);
        assert!(page.records.is_empty());
    }

    #[test]
    fn malformed_body_is_protocol_error() {
        let err = Shodan::default()
            .parse_page("<html>nope</html>", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Protocol { provider: "shodan", .. }));
    }
}
