// src/lib.rs
pub mod auth;
pub mod engine;
pub mod error;
pub mod output;
pub mod providers;
pub mod retry;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::error::Result;
use crate::retry::RequestGate;
use crate::types::{Cursor, ParsedPage, RequestSpec};

pub use crate::auth::CredentialStore;
pub use crate::engine::{Engine, EngineOptions, SearchRun};
pub use crate::error::EngineError;
pub use crate::types::{
    AssetRecord, OutputFormat, ProviderStatus, QueryRequest, RunOutcome,
};

/// One external asset-search service the engine can query.
///
/// Adapters translate between the engine's canonical shapes and the
/// provider's native API: `build_request` maps a query, credential, and
/// pagination cursor into a concrete HTTP request, and `parse_page` maps a
/// response body back into canonical records plus the next cursor. Both are
/// deterministic, which is what keeps every adapter unit-testable without a
/// network.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique registry name, also the key used for credential lookup.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Ordered credential field names this provider requires.
    ///
    /// The length is the credential arity: most providers need exactly
    /// `["api_key"]`, google needs `["api_key", "engine_id"]`, and the
    /// credential-free default engine declares `[]`.
    fn credential_fields(&self) -> &'static [&'static str];

    /// Build the request for one page. `cursor` is `None` for the first
    /// page and whatever the previous `parse_page` returned afterwards.
    fn build_request(
        &self,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<RequestSpec>;

    /// Parse one response body into canonical records and the next cursor.
    /// `cursor` is the cursor this page was fetched with, which offset-based
    /// providers need to compute the next one.
    fn parse_page(&self, body: &str, cursor: Option<&Cursor>) -> Result<ParsedPage>;

    /// Fetch and parse one page through the provider's request gate.
    async fn fetch_page(
        &self,
        gate: &RequestGate,
        query: &str,
        credential: &Credential,
        cursor: Option<&Cursor>,
    ) -> Result<ParsedPage> {
        let spec = self.build_request(query, credential, cursor)?;
        let body = gate.send(self.name(), &spec).await?;
        self.parse_page(&body, cursor)
    }
}

/// Immutable mapping from provider name to adapter, built once per run.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted for stable listings.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the full registry of supported providers.
pub fn build_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(providers::shodan::Shodan::default()));
    registry.register(Arc::new(providers::shodan_idb::ShodanIdb::default()));
    registry.register(Arc::new(providers::censys::Censys::default()));
    registry.register(Arc::new(providers::fofa::Fofa::default()));
    registry.register(Arc::new(providers::zoomeye::ZoomEye::default()));
    registry.register(Arc::new(providers::quake::Quake::default()));
    registry.register(Arc::new(providers::netlas::Netlas::default()));
    registry.register(Arc::new(providers::criminalip::CriminalIp::default()));
    registry.register(Arc::new(providers::hunterhow::HunterHow::default()));
    registry.register(Arc::new(providers::google::Google::default()));
    registry.register(Arc::new(providers::odin::Odin::default()));
    registry.register(Arc::new(providers::binaryedge::BinaryEdge::default()));
    registry.register(Arc::new(providers::onyphe::Onyphe::default()));
    registry
}

/// Name of the credential-free engine used for unscoped `-q` queries when
/// no configured provider is available.
pub const DEFAULT_ENGINE: &str = "shodan-idb";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_all_thirteen_providers() {
        let registry = build_registry();
        assert_eq!(registry.len(), 13);
        for name in [
            "shodan",
            "shodan-idb",
            "censys",
            "fofa",
            "zoomeye",
            "quake",
            "netlas",
            "criminalip",
            "hunterhow",
            "google",
            "odin",
            "binaryedge",
            "onyphe",
        ] {
            assert!(registry.contains(name), "missing provider {name}");
        }
    }

    #[test]
    fn registry_names_are_unique_and_sorted() {
        let registry = build_registry();
        let names = registry.names();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);
        assert!(names.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn default_engine_needs_no_credentials() {
        let registry = build_registry();
        let idb = registry.get(DEFAULT_ENGINE).unwrap();
        assert!(idb.credential_fields().is_empty());
    }

    #[test]
    fn google_declares_two_credential_fields() {
        let registry = build_registry();
        let google = registry.get("google").unwrap();
        assert_eq!(google.credential_fields(), &["api_key", "engine_id"]);
    }
}
