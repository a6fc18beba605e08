//! acctfetch core: the account aggregation pipeline.
//!
//! Reads identity records from a paginated source, drops privileged
//! accounts, looks each remaining account up in a document store with a
//! bounded number of lookups in flight, and folds the outcomes into one
//! all-or-nothing verdict.

pub mod aggregator;
pub mod filter;
pub mod lookup;
pub mod pipeline;
pub mod pool;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::ResultAggregator;
pub use filter::is_eligible;
pub use lookup::{DocumentStore, Enricher, Outcome, project};
pub use pipeline::{AggregationReport, Coordinator, PipelineState, ProgressReporter, SilentProgress};
pub use pool::WorkerPool;
pub use source::{IdentityProvider, IdentitySource, PagedReader};
