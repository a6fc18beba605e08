//! Aggregation coordinator: source → filter → pool → aggregator → verdict.
//!
//! One call to [`Coordinator::run`] is one pass. The coordinator pulls
//! records on the calling task, dispatches lookups through a
//! [`WorkerPool`], waits for the pool to drain, and only then decides
//! between [`PipelineState::Succeeded`] and [`PipelineState::Failed`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, trace, warn};

use acctfetch_shared::{
    AcctFetchError, AggregationResult, FailureRecord, LookupError, PipelineConfig, Result, RunId,
};

use crate::aggregator::ResultAggregator;
use crate::filter::is_eligible;
use crate::lookup::{DocumentStore, Enricher, Outcome};
use crate::pool::WorkerPool;
use crate::source::IdentitySource;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Reading,
    Dispatching,
    Draining,
    Succeeded,
    Failed,
}

/// Everything known about one finished run.
#[derive(Debug)]
pub struct AggregationReport {
    pub run_id: RunId,
    pub state: PipelineState,
    pub result: AggregationResult,
    /// Set when the identity source failed and dispatch stopped early.
    pub source_error: Option<AcctFetchError>,
    /// Most lookups admitted at once.
    pub peak_in_flight: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl AggregationReport {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Collapse the report into the caller-facing verdict.
    ///
    /// A source failure wins over per-record failures. Any per-record
    /// failure turns the whole run into [`AcctFetchError::Incomplete`].
    pub fn into_outcome(self) -> Result<AggregationResult> {
        if let Some(e) = self.source_error {
            return Err(e);
        }
        if !self.result.failures.is_empty() {
            return Err(AcctFetchError::Incomplete {
                failed: self.result.failures.len(),
            });
        }
        Ok(self.result)
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called after each record is read from the source.
    fn record_read(&self, scanned: usize);
    /// Called when the filter rejects a record.
    fn record_excluded(&self, uid: &str);
    /// Called from a worker task once a lookup settles.
    fn record_finished(&self, outcome: &Outcome);
    /// Called once the verdict is known.
    fn done(&self, report: &AggregationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn record_read(&self, _scanned: usize) {}
    fn record_excluded(&self, _uid: &str) {}
    fn record_finished(&self, _outcome: &Outcome) {}
    fn done(&self, _report: &AggregationReport) {}
}

/// Drives one aggregation pass per call.
pub struct Coordinator {
    config: PipelineConfig,
    enricher: Enricher,
    progress: Arc<dyn ProgressReporter>,
}

impl Coordinator {
    /// Validate `config` and bind the document store.
    pub fn new(config: PipelineConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;
        let enricher = Enricher::new(store, &config.collection, &config.fields);
        Ok(Self {
            config,
            enricher,
            progress: Arc::new(SilentProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one pass and return the caller-facing verdict.
    pub async fn aggregate<S>(&self, source: &mut S) -> Result<AggregationResult>
    where
        S: IdentitySource + ?Sized,
    {
        self.run(source).await.into_outcome()
    }

    /// Run one pass and return the full report, failures included.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, concurrency = self.config.concurrency))]
    pub async fn run<S>(&self, source: &mut S) -> AggregationReport
    where
        S: IdentitySource + ?Sized,
    {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let clock = Instant::now();

        let sink = Arc::new(ResultAggregator::new());
        let mut pool = WorkerPool::new(self.config.concurrency);
        let mut state = PipelineState::Reading;
        let mut scanned = 0usize;
        let mut excluded = 0usize;
        let mut source_error = None;

        info!("starting aggregation");

        loop {
            let record = match source.next().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, scanned, "identity source failed, halting dispatch");
                    source_error = Some(e);
                    break;
                }
            };
            scanned += 1;
            self.progress.record_read(scanned);

            if !is_eligible(&record) {
                excluded += 1;
                debug!(uid = %record.uid, "privileged account, skipping");
                self.progress.record_excluded(&record.uid);
                continue;
            }

            advance(&mut state, PipelineState::Dispatching);
            let uid = record.uid.clone();
            let enricher = self.enricher.clone();
            let task_sink = Arc::clone(&sink);
            let progress = Arc::clone(&self.progress);
            let submitted = pool
                .submit(uid.clone(), async move {
                    let outcome = enricher.enrich(record).await;
                    progress.record_finished(&outcome);
                    task_sink.record(outcome).await;
                })
                .await;

            if let Err(e) = submitted {
                error!(%uid, error = %e, "could not dispatch lookup, halting");
                sink.push_failure(FailureRecord {
                    uid,
                    cause: LookupError::Aborted(e.to_string()),
                })
                .await;
                source_error = Some(e);
                break;
            }
            advance(&mut state, PipelineState::Reading);
        }

        advance(&mut state, PipelineState::Draining);
        for (uid, reason) in pool.drain().await {
            sink.push_failure(FailureRecord {
                uid,
                cause: LookupError::Aborted(reason),
            })
            .await;
        }

        let (records, failures) = sink.take().await;
        let result = AggregationResult {
            records,
            failures,
            scanned,
            excluded,
        };

        let verdict = if source_error.is_none() && result.failures.is_empty() {
            PipelineState::Succeeded
        } else {
            PipelineState::Failed
        };
        advance(&mut state, verdict);

        let report = AggregationReport {
            run_id,
            state,
            source_error,
            peak_in_flight: pool.peak(),
            started_at,
            finished_at: Utc::now(),
            elapsed: clock.elapsed(),
            result,
        };

        if report.succeeded() {
            info!(
                scanned = report.result.scanned,
                excluded = report.result.excluded,
                enriched = report.result.records.len(),
                peak_in_flight = report.peak_in_flight,
                duration_ms = report.elapsed.as_millis(),
                "aggregation completed"
            );
        } else {
            warn!(
                scanned = report.result.scanned,
                excluded = report.result.excluded,
                enriched = report.result.records.len(),
                failed = report.result.failures.len(),
                source_failed = report.source_error.is_some(),
                duration_ms = report.elapsed.as_millis(),
                "aggregation failed"
            );
        }
        self.progress.done(&report);
        report
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    if *state != next {
        trace!(from = ?*state, to = ?next, "pipeline state");
        *state = next;
    }
}
