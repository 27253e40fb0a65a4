//! Core types shared by the engine and provider adapters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;

/// How the engine serializes admitted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `host:port` / `ip:port` lines, one per record
    #[default]
    HostPort,
    /// One JSON object per line
    Json,
}

/// A search request as handed to the engine by the caller.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Raw query string, passed to each adapter untranslated
    pub query: String,

    /// Selected provider names. Empty means "all providers whose
    /// credentials resolve".
    pub providers: Vec<String>,

    /// Global cap on emitted records across all providers
    pub limit: Option<usize>,

    pub format: OutputFormat,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A normalized asset record from any provider.
///
/// Adapters map their native response schema into this shape; everything
/// downstream (dedup, output) only sees `AssetRecord`.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Provider that produced this record
    pub source: &'static str,

    /// Native payload the record was extracted from, kept for `--json`
    /// consumers that want provider-specific fields
    #[serde(skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl AssetRecord {
    pub fn new(source: &'static str) -> Self {
        Self {
            ip: None,
            port: None,
            host: None,
            source,
            raw: Value::Null,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// A record with neither an IP nor a host identifies nothing and is
    /// dropped by the driver before it reaches dedup.
    pub fn is_well_formed(&self) -> bool {
        self.ip.is_some() || self.host.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Identity used to collapse duplicates across providers and pages.
    ///
    /// IP-bearing records key on `ip:port` (bare IP when the port is
    /// unknown); host-only records key on the lowercased host with any
    /// trailing dot stripped.
    pub fn dedup_key(&self) -> String {
        match (self.ip, self.port) {
            (Some(ip), Some(port)) => format!("{ip}:{port}"),
            (Some(ip), None) => ip.to_string(),
            (None, _) => {
                let host = self
                    .host
                    .as_deref()
                    .unwrap_or_default()
                    .trim_end_matches('.')
                    .to_ascii_lowercase();
                match self.port {
                    Some(port) => format!("{host}:{port}"),
                    None => host,
                }
            }
        }
    }
}

impl fmt::Display for AssetRecord {
    /// `host:port` rendering used by the raw output format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint: String = match (&self.ip, &self.host) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(host)) => host.clone(),
            (None, None) => String::new(),
        };
        match self.port {
            Some(port) => write!(f, "{endpoint}:{port}"),
            None => write!(f, "{endpoint}"),
        }
    }
}

/// A provider-shaped request, produced by `build_request` and executed by
/// the retry gate. Deterministic for identical inputs, which keeps adapters
/// unit-testable without a network.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: reqwest::Method,
    pub url: url::Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn get(url: url::Url) -> Self {
        Self {
            method: reqwest::Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: url::Url) -> Self {
        Self {
            method: reqwest::Method::POST,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Pagination cursor, opaque to the driver.
///
/// Providers either hand back a continuation token or use plain numeric
/// offsets; the driver threads whichever back into `build_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Token(String),
    Offset(u64),
}

impl Cursor {
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Cursor::Token(t) => Some(t),
            Cursor::Offset(_) => None,
        }
    }

    pub fn as_offset(&self) -> Option<u64> {
        match self {
            Cursor::Offset(n) => Some(*n),
            Cursor::Token(_) => None,
        }
    }
}

/// One parsed page of provider results.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub records: Vec<AssetRecord>,
    /// Cursor for the next page; `None` marks the provider exhausted
    pub next_cursor: Option<Cursor>,
    /// Provider signaled throttling in-band (e.g. an error field rather
    /// than an HTTP 429)
    pub rate_limited: bool,
}

/// Terminal state of one provider within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderStatus {
    Succeeded { records: usize },
    Failed { reason: String },
    Skipped { missing_field: String },
}

/// Per-provider terminal states plus run totals, built once when every
/// provider task has finished.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub providers: Vec<(String, ProviderStatus)>,
    pub emitted: usize,
    pub limit_reached: bool,
}

impl RunOutcome {
    /// True when no provider reached a successful terminal state.
    pub fn is_aggregate_failure(&self) -> bool {
        !self
            .providers
            .iter()
            .any(|(_, s)| matches!(s, ProviderStatus::Succeeded { .. }))
    }

    /// Human-readable summary of every non-successful provider, used for
    /// the aggregate failure message.
    pub fn failure_detail(&self) -> String {
        self.providers
            .iter()
            .filter_map(|(name, status)| match status {
                ProviderStatus::Failed { reason } => Some(format!("{name}: {reason}")),
                ProviderStatus::Skipped { missing_field } => {
                    Some(format!("{name}: missing credential field '{missing_field}'"))
                }
                ProviderStatus::Succeeded { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_prefers_ip_port() {
        let record = AssetRecord::new("shodan")
            .with_ip("93.184.216.34".parse().unwrap())
            .with_port(443)
            .with_host("example.com");
        assert_eq!(record.dedup_key(), "93.184.216.34:443");
    }

    #[test]
    fn dedup_key_normalizes_host() {
        let record = AssetRecord::new("google").with_host("Sub.Example.COM.");
        assert_eq!(record.dedup_key(), "sub.example.com");
    }

    #[test]
    fn host_only_records_are_well_formed() {
        let record = AssetRecord::new("google").with_host("example.com");
        assert!(record.is_well_formed());
        assert!(!AssetRecord::new("google").is_well_formed());
        assert!(!AssetRecord::new("google").with_host("").is_well_formed());
    }

    #[test]
    fn display_matches_raw_format() {
        let record = AssetRecord::new("shodan")
            .with_ip("10.0.0.1".parse().unwrap())
            .with_port(8080);
        assert_eq!(record.to_string(), "10.0.0.1:8080");

        let host_only = AssetRecord::new("google").with_host("example.com");
        assert_eq!(host_only.to_string(), "example.com");
    }

    #[test]
    fn outcome_aggregate_failure() {
        let outcome = RunOutcome {
            providers: vec![
                (
                    "shodan".into(),
                    ProviderStatus::Failed { reason: "HTTP 500".into() },
                ),
                (
                    "google".into(),
                    ProviderStatus::Skipped { missing_field: "engine_id".into() },
                ),
            ],
            emitted: 0,
            limit_reached: false,
        };
        assert!(outcome.is_aggregate_failure());
        assert!(outcome.failure_detail().contains("engine_id"));

        let ok = RunOutcome {
            providers: vec![("shodan".into(), ProviderStatus::Succeeded { records: 3 })],
            emitted: 3,
            limit_reached: false,
        };
        assert!(!ok.is_aggregate_failure());
    }
}
