//! Search orchestration.
//!
//! The engine resolves the provider set for a query, fails fast on missing
//! credentials, fans one driver task out per runnable provider, and fans
//! their records in through the dedup gate into a bounded channel the
//! caller consumes. A run-scoped cancellation token stops all drivers as
//! soon as the global result limit is reached.

mod dedup;
mod driver;

pub use dedup::DedupSet;

use crate::auth::CredentialStore;
use crate::error::{EngineError, Result};
use crate::retry::{RequestGate, RetryPolicy};
use crate::types::{AssetRecord, ProviderStatus, QueryRequest, RunOutcome};
use crate::{ProviderRegistry, DEFAULT_ENGINE};
use driver::ProviderDriver;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 256;
const USER_AGENT: &str = concat!("netscry/", env!("CARGO_PKG_VERSION"));

/// Tunables the spec leaves open; defaults follow the free-tier behavior
/// of the strictest providers.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Request starts per second, per provider
    pub requests_per_second: u32,
    /// Attempts per page, first try included
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Global emission budget; the first taker to fill it cancels the run.
pub(crate) struct EmitBudget {
    limit: Option<usize>,
    count: AtomicUsize,
    filled: AtomicBool,
}

impl EmitBudget {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            count: AtomicUsize::new(0),
            filled: AtomicBool::new(false),
        }
    }

    /// Claim one emission slot. Returns false (and cancels the run) when
    /// the limit is already spent.
    pub(crate) fn try_take(&self, cancel: &CancellationToken) -> bool {
        match self.limit {
            None => {
                self.count.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(limit) => {
                let taken = self
                    .count
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < limit).then_some(n + 1)
                    })
                    .is_ok();
                if !taken || self.count.load(Ordering::SeqCst) == limit {
                    self.filled.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
                taken
            }
        }
    }

    fn total(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn limit_reached(&self) -> bool {
        self.filled.load(Ordering::SeqCst)
    }
}

/// A running search: the deduplicated record stream plus the handle that
/// yields the per-provider outcome once every driver finished.
#[derive(Debug)]
pub struct SearchRun {
    pub results: mpsc::Receiver<AssetRecord>,
    pub outcome: JoinHandle<RunOutcome>,
    cancel: CancellationToken,
}

impl SearchRun {
    /// Abort the run early; drivers observe the token at their next
    /// suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct Engine {
    registry: ProviderRegistry,
    store: CredentialStore,
    options: EngineOptions,
    client: reqwest::Client,
}

impl Engine {
    pub fn new(
        registry: ProviderRegistry,
        store: CredentialStore,
        options: EngineOptions,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            registry,
            store,
            options,
            client,
        })
    }

    /// Start one search run.
    ///
    /// Credential checks happen here, before any task is spawned: a
    /// provider with an unmet credential arity never causes a network call.
    /// When the request selects exactly one provider and its credential is
    /// incomplete, the error surfaces directly; otherwise unmet providers
    /// are recorded as skipped in the outcome.
    pub async fn search(&self, request: QueryRequest) -> Result<SearchRun> {
        let selected = self.resolve_selection(&request)?;

        let mut runnable = Vec::new();
        let mut skipped: Vec<(String, ProviderStatus)> = Vec::new();
        let mut first_credential_error = None;
        for provider in selected {
            match self
                .store
                .resolve(provider.name(), provider.credential_fields())
            {
                Ok(credential) => runnable.push((provider, credential)),
                Err(err) => {
                    if let &EngineError::Credential { provider, field } = &err {
                        tracing::warn!(provider, field, "skipping provider, credential missing");
                        skipped.push((
                            provider.to_string(),
                            ProviderStatus::Skipped {
                                missing_field: field.to_string(),
                            },
                        ));
                    }
                    first_credential_error.get_or_insert(err);
                }
            }
        }

        if runnable.is_empty() {
            return Err(match first_credential_error {
                Some(err) => err,
                None => EngineError::NoProviders("empty provider selection".to_string()),
            });
        }

        let cancel = CancellationToken::new();
        let budget = Arc::new(EmitBudget::new(request.limit));
        let dedup = Arc::new(DedupSet::new());
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let policy = RetryPolicy {
            max_attempts: self.options.max_retries,
            base_delay: self.options.retry_base_delay,
        };

        let mut handles = Vec::with_capacity(runnable.len());
        for (provider, credential) in runnable {
            let gate = RequestGate::new(
                self.client.clone(),
                self.options.requests_per_second,
                policy,
                cancel.clone(),
            )?;
            let driver = ProviderDriver {
                provider: Arc::clone(&provider),
                gate,
                credential,
                query: request.query.clone(),
                rate_limit_strikes: self.options.max_retries,
            };
            let name = provider.name();
            tracing::debug!(provider = name, "starting provider");
            handles.push((
                name,
                tokio::spawn(driver.run(
                    tx.clone(),
                    Arc::clone(&dedup),
                    Arc::clone(&budget),
                    cancel.clone(),
                )),
            ));
        }
        drop(tx); // channel closes once the last driver finishes

        let outcome = tokio::spawn(async move {
            let mut providers = skipped;
            let finished = futures::future::join_all(handles.into_iter().map(
                |(name, handle)| async move {
                    let status = handle.await.unwrap_or_else(|e| ProviderStatus::Failed {
                        reason: format!("provider task panicked: {e}"),
                    });
                    (name.to_string(), status)
                },
            ))
            .await;
            providers.extend(finished);
            RunOutcome {
                providers,
                emitted: budget.total(),
                limit_reached: budget.limit_reached(),
            }
        });

        Ok(SearchRun {
            results: rx,
            outcome,
            cancel,
        })
    }

    fn resolve_selection(
        &self,
        request: &QueryRequest,
    ) -> Result<Vec<Arc<dyn crate::Provider>>> {
        if request.query.trim().is_empty() {
            return Err(EngineError::InvalidQuery("empty query".to_string()));
        }

        if !request.providers.is_empty() {
            let mut selected = Vec::with_capacity(request.providers.len());
            for name in &request.providers {
                let provider = self.registry.get(name).ok_or_else(|| {
                    EngineError::NoProviders(format!("unknown provider '{name}'"))
                })?;
                selected.push(provider);
            }
            return Ok(selected);
        }

        // Unscoped query: every provider whose credentials resolve, or the
        // credential-free default engine when nothing is configured.
        let mut selected: Vec<_> = self
            .registry
            .iter()
            .filter(|p| {
                !p.credential_fields().is_empty()
                    && self.store.satisfies(p.name(), p.credential_fields())
            })
            .cloned()
            .collect();
        selected.sort_by_key(|p| p.name());

        if selected.is_empty() {
            let default = self.registry.get(DEFAULT_ENGINE).ok_or_else(|| {
                EngineError::NoProviders("default engine not registered".to_string())
            })?;
            selected.push(default);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_registry;

    #[test]
    fn budget_is_a_hard_cap() {
        let cancel = CancellationToken::new();
        let budget = EmitBudget::new(Some(3));
        assert!(budget.try_take(&cancel));
        assert!(budget.try_take(&cancel));
        assert!(budget.try_take(&cancel));
        assert!(!budget.try_take(&cancel));
        assert!(!budget.try_take(&cancel));
        assert_eq!(budget.total(), 3);
        assert!(budget.limit_reached());
        assert!(cancel.is_cancelled(), "filling the budget cancels the run");
    }

    #[test]
    fn unlimited_budget_never_cancels() {
        let cancel = CancellationToken::new();
        let budget = EmitBudget::new(None);
        for _ in 0..1000 {
            assert!(budget.try_take(&cancel));
        }
        assert!(!budget.limit_reached());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn single_provider_missing_credential_fails_fast() {
        let engine = Engine::new(
            build_registry(),
            CredentialStore::empty(),
            EngineOptions::default(),
        )
        .unwrap();
        let request = QueryRequest::new("title:\"Grafana\"").with_providers(["shodan"]);
        let err = engine.search(request).await.unwrap_err();
        match err {
            EngineError::Credential { provider, field } => {
                assert_eq!(provider, "shodan");
                assert_eq!(field, "api_key");
            }
            other => panic!("expected Credential error, got {other}"),
        }
    }

    #[tokio::test]
    async fn two_secret_provider_reports_the_missing_second_field() {
        let store = CredentialStore::from_yaml("google: [only-the-key]").unwrap();
        let engine = Engine::new(build_registry(), store, EngineOptions::default()).unwrap();
        let request = QueryRequest::new("site:*.hackerone.com").with_providers(["google"]);
        let err = engine.search(request).await.unwrap_err();
        assert!(err.to_string().contains("engine_id"), "got: {err}");
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let engine = Engine::new(
            build_registry(),
            CredentialStore::empty(),
            EngineOptions::default(),
        )
        .unwrap();
        let request = QueryRequest::new("x").with_providers(["no-such-engine"]);
        assert!(matches!(
            engine.search(request).await.unwrap_err(),
            EngineError::NoProviders(_)
        ));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let engine = Engine::new(
            build_registry(),
            CredentialStore::empty(),
            EngineOptions::default(),
        )
        .unwrap();
        assert!(matches!(
            engine.search(QueryRequest::new("  ")).await.unwrap_err(),
            EngineError::InvalidQuery(_)
        ));
    }
}
