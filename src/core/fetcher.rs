//! Bounded fan-out over the pending identifier set.
//!
//! Each identifier takes an admission slot, pulls the current proxy and auth
//! credentials, makes one transport call and classifies the outcome. Workers
//! share nothing beyond the admission gate and the two rotators, so one bad
//! record can never stall the batch. After a success the worker sleeps a
//! jittered interval while still holding its slot, pacing the request rate
//! per logical worker; failures release the slot immediately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use log::warn;
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::auth::proxy::ProxyRotator;
use crate::auth::AuthRotator;
use crate::core::reconcile::RecordId;
use crate::core::report::{HarvestAggregator, HarvestReport};
use crate::error::FetchError;
use crate::http::client::DetailTransport;
use crate::store::RecordStore;
use crate::HarvestConfig;

/// Outcome of one identifier within one run.
#[derive(Debug)]
pub struct FetchRecord {
    pub id: RecordId,
    pub outcome: Result<Value, FetchError>,
}

pub struct BoundedFetcher {
    transport: Arc<dyn DetailTransport>,
    proxies: Arc<ProxyRotator>,
    auth: Arc<AuthRotator>,
    concurrency: usize,
    jitter: (Duration, Duration),
    max_attempts: u32,
}

impl BoundedFetcher {
    pub fn new(
        transport: Arc<dyn DetailTransport>,
        proxies: Arc<ProxyRotator>,
        auth: Arc<AuthRotator>,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            transport,
            proxies,
            auth,
            concurrency: config.concurrency.max(1),
            jitter: config.jitter_range(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Drains the pending set, emitting one [`FetchRecord`] per identifier
    /// that ran. Cancellation is observed before admission, around the
    /// transport call and during the pacing sleep; identifiers that never
    /// started simply emit nothing.
    pub async fn run(
        &self,
        pending: HashSet<RecordId>,
        results: mpsc::Sender<FetchRecord>,
        cancel: CancellationToken,
    ) {
        stream::iter(pending)
            .map(|id| {
                let results = results.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return,
                        outcome = self.fetch_one(&id) => outcome,
                    };
                    if outcome.is_ok() {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sleep(self.jitter_interval()) => {}
                        }
                    }
                    let _ = results.send(FetchRecord { id, outcome }).await;
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<()>>()
            .await;
    }

    /// Convenience wrapper: wires [`run`](Self::run) to the aggregator and
    /// returns the assembled report, persisting successes when a store is
    /// given.
    pub async fn fetch_all(
        &self,
        pending: HashSet<RecordId>,
        store: Option<Arc<dyn RecordStore>>,
        cancel: CancellationToken,
    ) -> HarvestReport {
        let (tx, rx) = mpsc::channel(100);
        let (_, report) = tokio::join!(
            self.run(pending, tx, cancel),
            HarvestAggregator::run(rx, store)
        );
        report
    }

    async fn fetch_one(&self, id: &RecordId) -> Result<Value, FetchError> {
        let mut attempt = 1;
        loop {
            match self.attempt(id).await {
                Ok(payload) => return Ok(payload),
                Err(err) if attempt < self.max_attempts && err.retryable() => {
                    warn!(
                        "attempt {}/{} for {} failed, retrying: {}",
                        attempt, self.max_attempts, id, err
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, id: &RecordId) -> Result<Value, FetchError> {
        let proxy = self.proxies.acquire().await?;
        let auth = self.auth.acquire().await?;
        self.transport.fetch_detail(id, &proxy, &auth).await
    }

    fn jitter_interval(&self) -> Duration {
        let (lo, hi) = self.jitter;
        if hi <= lo {
            return lo;
        }
        let ms = rand::rng().random_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        Duration::from_millis(ms)
    }
}
