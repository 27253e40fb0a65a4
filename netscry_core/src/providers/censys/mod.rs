//! Censys hosts search (API v2).
//!
//! Bearer-token auth, opaque continuation cursor, one canonical record per
//! (host, service) pair.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://search.censys.io";
const PER_PAGE: u64 = 100;

pub struct Censys {
    base_url: Url,
}

impl Censys {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Censys {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize, Default)]
struct Links {
    #[serde(default)]
    next: String,
}

#[derive(Debug, Deserialize)]
struct Hit {
    ip: Option<String>,
    name: Option<String>,
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct Service {
    port: u16,
}

#[async_trait]
impl Provider for Censys {
    fn name(&self) -> &'static str {
        "censys"
    }

    fn description(&self) -> &'static str {
        "Censys host search (search.censys.io, API v2)."
    }

    fn credential_fields(&self) -> &'static [&'static str] {
        &["api_token"]
    }

    fn build_request(
        &self,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<RequestSpec> {
        let mut url = self.base_url.join("/api/v2/hosts/search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("per_page", &PER_PAGE.to_string());
            if let Some(token) = cursor.and_then(Cursor::as_token) {
                pairs.append_pair("cursor", token);
            }
        }
        Ok(RequestSpec::get(url)
            .with_header("Authorization", format!("Bearer {}", credential.secret(0)))
            .with_header("Accept", "application/json"))
    }

    fn parse_page(&self, body: &str, _cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "censys",
                message: e.to_string(),
            })?;

        let mut records = Vec::new();
        for hit in &response.result.hits {
            let ip = hit.ip.as_deref().and_then(super::opt_ip);
            let raw = serde_json::json!({
                "ip": hit.ip,
                "name": hit.name,
                "services": hit.services.iter().map(|s| s.port).collect::<Vec<_>>(),
            });
            if hit.services.is_empty() {
                let mut record = AssetRecord::new("censys").with_raw(raw.clone());
                if let Some(ip) = ip {
                    record = record.with_ip(ip);
                }
                if let Some(name) = &hit.name {
                    record = record.with_host(name.clone());
                }
                records.push(record);
                continue;
            }
            for service in &hit.services {
                let mut record = AssetRecord::new("censys")
                    .with_port(service.port)
                    .with_raw(raw.clone());
                if let Some(ip) = ip {
                    record = record.with_ip(ip);
                }
                if let Some(name) = &hit.name {
                    record = record.with_host(name.clone());
                }
                records.push(record);
            }
        }

        let next_cursor = if response.result.links.next.is_empty() {
            None
        } else {
            Some(Cursor::Token(response.result.links.next))
        };

        Ok(ParsedPage {
            records,
            next_cursor,
            rate_limited: false,
        })
    }
}
