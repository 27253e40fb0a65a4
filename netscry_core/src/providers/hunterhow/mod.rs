//! Hunter.how search. Base64 query in the URL, key as a query parameter,
//! 1-based page cursor.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.hunter.how";
const PAGE_SIZE: u64 = 100;

pub struct HunterHow {
    base_url: Url,
}

impl HunterHow {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for HunterHow {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Data,
}

#[derive(Debug, Deserialize, Default)]
struct Data {
    #[serde(default)]
    list: Vec<Entry>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Entry {
    ip: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    domain: Option<String>,
}

#[async_trait]
impl Provider for HunterHow {
    fn name(&self) -> &'static str {
        "hunterhow"
    }

    fn description(&self) -> &'static str {
        "Hunter.how internet asset search (api.hunter.how)."
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
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(query);
        let mut url = self.base_url.join("/search")?;
        url.query_pairs_mut()
            .append_pair("api-key", credential.secret(0))
            .append_pair("query", &encoded)
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &PAGE_SIZE.to_string());
        Ok(RequestSpec::get(url))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "hunterhow",
                message: e.to_string(),
            })?;

        if response.code != 200 {
            let msg = response.message.to_lowercase();
            if response.code == 429 || msg.contains("rate") {
                return Ok(ParsedPage {
                    rate_limited: true,
                    ..Default::default()
                });
            }
            return Err(EngineError::Protocol {
                provider: "hunterhow",
                message: format!("code {}: {}", response.code, response.message),
            });
        }

        let records: Vec<AssetRecord> = response
            .data
            .list
            .iter()
            .map(|e| {
                let mut record = AssetRecord::new("hunterhow").with_raw(serde_json::json!({
                    "ip": e.ip, "port": e.port, "domain": e.domain,
                }));
                if let Some(ip) = e.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = e.port {
                    record = record.with_port(port);
                }
                if let Some(domain) = e.domain.as_deref().filter(|d| !d.is_empty()) {
                    record = record.with_host(domain);
                }
                record
            })
            .collect();

        let page = cursor.and_then(Cursor::as_offset).unwrap_or(1);
        let next_cursor = if !records.is_empty() && page * PAGE_SIZE < response.data.total {
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
    fn query_is_urlsafe_base64() {
        let spec = HunterHow::default()
            .build_request("web.body=\"ElasticJob\"", &Credential::new(vec!["hk".into()]), None)
            .unwrap();
        let encoded = base64::engine::general_purpose::URL_SAFE.encode("web.body=\"ElasticJob\"");
        let query = spec.url.query().unwrap();
        assert!(query.contains(&format!("query={}", urlencoding::encode(&encoded))));
        assert!(query.contains("api-key=hk"));
    }

    #[test]
    fn parses_list_entries() {
        let body = json!({
            "code": 200,
            "data": {
                "list": [{"ip": "203.0.113.42", "port": 8081, "domain": "job.example.cn"}],
                "total": 1
            }
        })
        .to_string();
        let page = HunterHow::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].host.as_deref(), Some("job.example.cn"));
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn code_429_is_rate_limited() {
        let body = json!({"code": 429, "message": "too many requests", "data": {}}).to_string();
        let page = HunterHow::default().parse_page(&body, None).unwrap();
        assert!(page.rate_limited);
    }
}
