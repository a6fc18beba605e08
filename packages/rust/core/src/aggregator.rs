//! Shared outcome sink written to by worker tasks.

use tokio::sync::Mutex;

use acctfetch_shared::{EnrichedRecord, FailureRecord};

use crate::lookup::Outcome;

/// Enriched records and failures, each behind its own lock.
///
/// The two collections are never updated together, so one lock each is
/// enough. Every append is atomic; no ordering is promised beyond that.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Mutex<Vec<EnrichedRecord>>,
    failures: Mutex<Vec<FailureRecord>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_record(&self, record: EnrichedRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn push_failure(&self, failure: FailureRecord) {
        self.failures.lock().await.push(failure);
    }

    /// Route an outcome to the matching collection.
    pub async fn record(&self, outcome: Outcome) {
        match outcome {
            Ok(record) => self.push_record(record).await,
            Err(failure) => self.push_failure(failure).await,
        }
    }

    /// Move both collections out, leaving the aggregator empty.
    pub async fn take(&self) -> (Vec<EnrichedRecord>, Vec<FailureRecord>) {
        let records = std::mem::take(&mut *self.records.lock().await);
        let failures = std::mem::take(&mut *self.failures.lock().await);
        (records, failures)
    }
}
