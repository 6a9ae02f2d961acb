//! Collects fetch outcomes from the worker channel, persists successes and
//! tallies failures by kind.

use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::fetcher::FetchRecord;
use crate::core::reconcile::RecordId;
use crate::error::{FetchError, FetchErrorKind};
use crate::store::RecordStore;

#[derive(Debug, Default)]
pub struct HarvestReport {
    pub records: Vec<FetchRecord>,
    pub succeeded: usize,
    pub credential_failures: usize,
    pub status_failures: usize,
    pub transport_failures: usize,
    pub decode_failures: usize,
    /// Successful fetches the store refused; payload is still in `records`.
    pub store_failures: usize,
}

impl HarvestReport {
    pub fn outcome(&self, id: &RecordId) -> Option<&Result<Value, FetchError>> {
        self.records
            .iter()
            .find(|record| &record.id == id)
            .map(|record| &record.outcome)
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded
    }

    fn log_summary(&self) {
        info!(
            "harvest finished: {} fetched, {} dropped ({} credential, {} status, {} transport, {} decode), {} store failures",
            self.succeeded,
            self.failed(),
            self.credential_failures,
            self.status_failures,
            self.transport_failures,
            self.decode_failures,
            self.store_failures,
        );
    }
}

/// Drains the result channel until every worker has hung up.
pub struct HarvestAggregator;

impl HarvestAggregator {
    pub async fn run(
        mut results: mpsc::Receiver<FetchRecord>,
        store: Option<Arc<dyn RecordStore>>,
    ) -> HarvestReport {
        let mut report = HarvestReport::default();

        while let Some(record) = results.recv().await {
            match &record.outcome {
                Ok(payload) => {
                    report.succeeded += 1;
                    info!("fetched {}", record.id);
                    if let Some(store) = store.as_ref() {
                        if let Err(e) = store.persist(&record.id, payload).await {
                            report.store_failures += 1;
                            warn!("failed to persist {}: {:#}", record.id, e);
                        }
                    }
                }
                Err(err) => {
                    error!("dropping {}: {}", record.id, err);
                    match err.kind() {
                        FetchErrorKind::Credential => report.credential_failures += 1,
                        FetchErrorKind::Status => report.status_failures += 1,
                        FetchErrorKind::Transport => report.transport_failures += 1,
                        FetchErrorKind::Decode => report.decode_failures += 1,
                    }
                }
            }
            report.records.push(record);
        }

        report.log_summary();
        report
    }
}
