//! 360 Quake service search. POST body with a numeric start offset.

use crate::auth::Credential;
use crate::error::{EngineError, Result};
use crate::types::{AssetRecord, Cursor, ParsedPage, RequestSpec};
use crate::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://quake.360.net";
const PAGE_SIZE: u64 = 100;

pub struct Quake {
    base_url: Url,
}

impl Quake {
    pub fn with_base_url(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Default for Quake {
    fn default() -> Self {
        Self::with_base_url(super::base(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<Entry>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize, Default)]
struct Meta {
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize, Default)]
struct Pagination {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Entry {
    ip: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    hostname: Option<String>,
}

#[async_trait]
impl Provider for Quake {
    fn name(&self) -> &'static str {
        "quake"
    }

    fn description(&self) -> &'static str {
        "360 Quake service search (quake.360.net)."
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
        let url = self.base_url.join("/api/v3/search/quake_service")?;
        Ok(RequestSpec::post(url)
            .with_header("X-QuakeToken", credential.secret(0).to_string())
            .with_header("Content-Type", "application/json")
            .with_json(json!({
                "query": query,
                "start": start,
                "size": PAGE_SIZE,
            })))
    }

    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| EngineError::Protocol {
                provider: "quake",
                message: e.to_string(),
            })?;

        if response.code != 0 {
            let msg = response.message.to_lowercase();
            if msg.contains("rate") || msg.contains("frequency") {
                return Ok(ParsedPage {
                    rate_limited: true,
                    ..Default::default()
                });
            }
            return Err(EngineError::Protocol {
                provider: "quake",
                message: response.message,
            });
        }

        let records: Vec<AssetRecord> = response
            .data
            .iter()
            .map(|e| {
                let mut record = AssetRecord::new("quake").with_raw(json!({
                    "ip": e.ip, "port": e.port, "hostname": e.hostname,
                }));
                if let Some(ip) = e.ip.as_deref().and_then(super::opt_ip) {
                    record = record.with_ip(ip);
                }
                if let Some(port) = e.port {
                    record = record.with_port(port);
                }
                if let Some(host) = e.hostname.as_deref().filter(|h| !h.is_empty()) {
                    record = record.with_host(host);
                }
                record
            })
            .collect();

        let start = cursor.and_then(Cursor::as_offset).unwrap_or(0);
        let consumed = start + records.len() as u64;
        let next_cursor = if !records.is_empty() && consumed < response.meta.pagination.total {
            Some(Cursor::Offset(consumed))
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

    #[test]
    fn posts_query_with_offset() {
        let spec = Quake::default()
            .build_request("Grafana", &Credential::new(vec!["qt".into()]), Some(&Cursor::Offset(200)))
            .unwrap();
        assert_eq!(spec.method, reqwest::Method::POST);
        let body = spec.body.unwrap();
        assert_eq!(body["start"], 200);
        assert_eq!(body["query"], "Grafana");
        assert!(spec.headers.iter().any(|(k, v)| *k == "X-QuakeToken" && v == "qt"));
    }

    #[test]
    fn offset_advances_by_records_consumed() {
        let data: Vec<_> = (0..100)
            .map(|i| json!({"ip": format!("198.51.100.{}", i % 250), "port": 443}))
            .collect();
        let body = json!({
            "code": 0, "message": "ok", "data": data,
            "meta": {"pagination": {"total": 150}}
        })
        .to_string();

        let page = Quake::default().parse_page(&body, None).unwrap();
        assert_eq!(page.records.len(), 100);
        assert_eq!(page.next_cursor, Some(Cursor::Offset(100)));
    }

    #[test]
    fn nonzero_code_is_protocol_error() {
        let body = json!({"code": 401, "message": "token invalid", "data": []}).to_string();
        assert!(Quake::default().parse_page(&body, None).is_err());
    }

    #[test]
    fn frequency_message_is_rate_limited() {
        let body = json!({"code": 3005, "message": "request frequency exceeded", "data": []})
            .to_string();
        let page = Quake::default().parse_page(&body, None).unwrap();
        assert!(page.rate_limited);
    }
}
