//! Shodan InternetDB lookup, the credential-free default engine.
//!
//! InternetDB answers per-address: the query is taken as an IP (or a bare
//! hostname, which the service looks up itself) and the single response
//! fans out into one record per open port. No pagination, no credentials.
//! A 404 means "nothing known about this address" and is treated as an
//! empty result set rather than a failure.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::retry::RequestGate;
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://internetdb.shodan.io";

pub struct ShodanIdb {
    base_url: Url,
}

impl ShodanIdb {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for ShodanIdb {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct IdbResponse {
    ip: String,
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    hostnames: Vec<String>,
}

#[async_trait]
impl Provider for ShodanIdb {
    fn name(&self) -> &'static str {
        "shodan-idb"
    }

    fn description(&self) -> &'static str {
        "Shodan InternetDB free lookup (internetdb.shodan.io)."
    }

    fn credential_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_request(
        &self,
        query: &str,
        _credential: &Credential,
        _cursor: Option<&Cursor>,
    ) -> Result<RequestSpec> {
        let target = query.trim().trim_matches('\'').trim_matches('"');
        if target.is_empty() {
            return Err(EngineError::InvalidQuery("empty lookup target".to_string()));
        }
        let url = self.base_url.join(&format!("/{}", urlencoding::encode(target)))?;
        Ok(RequestSpec::get(url))
    }

    fn parse_page(&self, body: &str, _cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: IdbResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "shodan-idb",
                message: e.to_string(),
            })?;

        let host = response.hostnames.first().cloned();
        let ip = super::opt_ip(&response.ip);
        let raw = serde_json::json!({
            "ip": response.ip,
            "ports": response.ports,
            "hostnames": response.hostnames,
        });

        let records = if response.ports.is_empty() {
            let mut record = AssetRecord::new("shodan-idb").with_raw(raw);
            if let Some(ip) = ip {
                record = record.with_ip(ip);
            }
            if let Some(host) = host {
                record = record.with_host(host);
            }
            vec![record]
        } else {
            response
                .ports
                .iter()
                .map(|&port| {
                    let mut record = AssetRecord::new("shodan-idb")
                        .with_port(port)
                        .with_raw(raw.clone());
                    if let Some(ip) = ip {
                        record = record.with_ip(ip);
                    }
                    if let Some(host) = &host {
                        record = record.with_host(host.clone());
                    }
                    record
                })
                .collect()
        };

        Ok(ParsedPage {
            records,
            next_cursor: None,
            rate_limited: false,
        })
    }

    async fn fetch_page(
        &self,
        gate: &RequestGate,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<ParsedPage> {
        let spec = self.build_request(query, credential, cursor)?;
        match gate.send(self.name(), &spec).await {
            Ok(body) => self.parse_page(&body, cursor),
            // unknown address: empty result, not an error
            Err(EngineError::UpstreamStatus { status: 404, .. }) => Ok(ParsedPage::default()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_path_is_the_query() {
        let spec = ShodanIdb::default()
            .build_request("1.1.1.1", &Credential::default(), None)
            .unwrap();
        assert_eq!(spec.url.path(), "/1.1.1.1");
    }

    #[test]
    fn surrounding_quotes_are_stripped() {
        let spec = ShodanIdb::default()
            .build_request("'8.8.8.8'", &Credential::default(), None)
            .unwrap();
        assert_eq!(spec.url.path(), "/8.8.8.8");
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = ShodanIdb::default()
            .build_request("  ", &Credential::default(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }

    #[test]
    fn one_record_per_open_port() {
        let body = json!({
            "ip": "1.1.1.1",
            "ports": [53, 80, 443],
            "hostnames": ["one.one.one.one"]
        })
        .to_string();

        let page = ShodanIdb::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.records[2].dedup_key(), "1.1.1.1:443");
        assert_eq!(page.records[0].host.as_deref(), Some("one.one.one.one"));
        assert!(page.next_cursor.is_none(), "single page only");
    }

    #[test]
    fn portless_answer_still_yields_the_address() {
        let body = json!({"ip": "203.0.113.1", "ports": [], "hostnames": []}).to_string();
        let page = ShodanIdb::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].dedup_key(), "203.0.113.1");
    }
}
