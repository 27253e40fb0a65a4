//! Odin hosts search. POST body with a search-after token cursor carried
//! as the JSON-serialized `last` array of the previous page.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.odin.io";
const PAGE_SIZE: u64 = 100;

pub struct Odin {
    base_url: Url,
}

impl Odin {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Odin {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<HostEntry>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize, Default)]
struct Pagination {
    #[serde(default)]
    last: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    ip: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    port: u16,
}

#[async_trait]
impl Provider for Odin {
    fn name(&self) -> &'static str {
        "odin"
    }

    fn description(&self) -> &'static str {
        "Odin host search (api.odin.io)."
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
        let url = self.base_url.join("/v1/hosts/search")?;
        let mut body = json!({ "query": query, "limit": PAGE_SIZE });
        if let Some(token) = cursor.and_then(Cursor::as_token) {
            let last: Value = serde_json::from_str(token).map_err(|e| {
                EngineError::Protocol {
                    provider: "odin",
                    message: format!("bad cursor: {e}"),
                }
            })?;
            body["start"] = last;
        }
        Ok(RequestSpec::post(url)
            .with_header("X-API-Key", credential.secret(0).to_string())
            .with_header("Content-Type", "application/json")
            .with_json(body))
    }

    fn parse_page(&self, body: &str, _cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "odin",
                message: e.to_string(),
            })?;

        if !response.success {
            return Err(EngineError::Protocol {
                provider: "odin",
                message: "unsuccessful response".to_string(),
            });
        }

        let mut records = Vec::new();
        for entry in &response.data {
            let ip = entry.ip.as_deref().and_then(super::opt_ip);
            let raw = json!({
                "ip": entry.ip,
                "hostname": entry.hostname,
                "services": entry.services.iter().map(|s| s.port).collect::<Vec<_>>(),
            });
            if entry.services.is_empty() {
                let mut record = AssetRecord::new("odin").with_raw(raw.clone());
                if let Some(ip) = ip {
                    record = record.with_ip(ip);
                }
                if let Some(host) = entry.hostname.as_deref().filter(|h| !h.is_empty()) {
                    record = record.with_host(host);
                }
                records.push(record);
                continue;
            }
            for service in &entry.services {
                let mut record = AssetRecord::new("odin")
                    .with_port(service.port)
                    .with_raw(raw.clone());
                if let Some(ip) = ip {
                    record = record.with_ip(ip);
                }
                if let Some(host) = entry.hostname.as_deref().filter(|h| !h.is_empty()) {
                    record = record.with_host(host);
                }
                records.push(record);
            }
        }

        let next_cursor = match (&response.pagination.last, records.is_empty()) {
            (Some(last), false) if !last.is_null() => Some(Cursor::Token(last.to_string())),
            _ => None,
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

    #[test]
    fn first_page_has_no_start() {
        let spec = Odin::default()
            .build_request("nginx", &Credential::new(vec!["ok".into()]), None)
            .unwrap();
        let body = spec.body.unwrap();
        assert!(body.get("start").is_none());
        assert_eq!(body["query"], "nginx");
    }

    #[test]
    fn cursor_token_feeds_back_as_start_array() {
        let spec = Odin::default()
            .build_request(
                "nginx",
                &Credential::new(vec!["ok".into()]),
                Some(&Cursor::Token("[1699999999,\"h-42\"]".into())),
            )
            .unwrap();
        let body = spec.body.unwrap();
        assert_eq!(body["start"], json!([1699999999u64, "h-42"]));
    }

    #[test]
    fn pagination_last_becomes_token() {
        let body = json!({
            "success": true,
            "data": [
                {"ip": "192.0.2.77", "hostname": "web.example.net", "services": [{"port": 80}]}
            ],
            "pagination": {"last": [1699999999u64, "h-42"]}
        })
        .to_string();

        let page = Odin::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 1);
        let token = page.next_cursor.unwrap();
        assert_eq!(token.as_token().unwrap(), "[1699999999,\"h-42\"]");
    }

    #[test]
    fn unsuccessful_response_is_protocol_error() {
        let body = json!({"success": false, "data": []}).to_string();
        assert!(Odin::default().parse_page(&body, None).is_err());
    }
}
