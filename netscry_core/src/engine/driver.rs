//! Per-provider pagination driver.
//!
//! Each selected provider gets one driver task. The driver walks the
//! provider's pages strictly sequentially (page n+1 needs page n's cursor),
//! pushing every parsed record downstream immediately, and terminates on
//! exhaustion, the global limit, cancellation, or retry exhaustion.
//! Nothing here is shared with sibling drivers except the dedup set and
//! the fan-in channel.

use super::dedup::DedupSet;
use super::EmitBudget;
use crate::auth::Credential;
use crate::error::EngineError;
use crate::retry::RequestGate;
use crate::types::{AssetRecord, Cursor, ParsedPage, ProviderStatus};
use crate::Provider;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct ProviderDriver {
    pub provider: Arc<dyn Provider>,
    pub gate: RequestGate,
    pub credential: Credential,
    pub query: String,
    pub rate_limit_strikes: u32,
}

impl ProviderDriver {
    pub(crate) async fn run(
        self,
        tx: mpsc::Sender<AssetRecord>,
        dedup: Arc<DedupSet>,
        budget: Arc<EmitBudget>,
        cancel: CancellationToken,
    ) -> ProviderStatus {
        let name = self.provider.name();
        let mut cursor: Option<Cursor> = None;
        let mut emitted = 0usize;
        let mut strikes = 0u32;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let page = match self
                .provider
                .fetch_page(&self.gate, &self.query, &self.credential, cursor.as_ref())
                .await
            {
                Ok(page) => page,
                Err(EngineError::Cancelled) => break,
                Err(EngineError::Protocol { message, .. }) => {
                    // the page is lost and with it any next cursor; the
                    // provider is exhausted here, not failed
                    tracing::warn!(provider = name, error = %message, "unparseable page, skipping");
                    break;
                }
                Err(err) => {
                    tracing::warn!(provider = name, error = %err, "provider failed");
                    return ProviderStatus::Failed {
                        reason: err.to_string(),
                    };
                }
            };

            if page.rate_limited {
                strikes += 1;
                if strikes >= self.rate_limit_strikes {
                    return ProviderStatus::Failed {
                        reason: "rate limited beyond retry budget".to_string(),
                    };
                }
                tracing::debug!(provider = name, strikes, "in-band rate limit, backing off");
                if !self.gate.backoff(strikes - 1).await {
                    break;
                }
                continue; // retry the same cursor
            }
            strikes = 0;

            let ParsedPage {
                records,
                next_cursor,
                ..
            } = page;

            let total = records.len();
            let mut dropped = 0usize;
            let mut stop = false;
            for record in records {
                if !record.is_well_formed() {
                    dropped += 1;
                    continue;
                }
                if !dedup.admit(&record) {
                    continue;
                }
                if !budget.try_take(&cancel) {
                    stop = true;
                    break;
                }
                if tx.send(record).await.is_err() {
                    // consumer went away; treat like cancellation
                    stop = true;
                    break;
                }
                emitted += 1;
            }
            if dropped > 0 {
                tracing::debug!(provider = name, dropped, total, "dropped malformed records");
            }
            if stop || cancel.is_cancelled() {
                break;
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(provider = name, emitted, "provider done");
        ProviderStatus::Succeeded { records: emitted }
    }
}
