//! Shared types, error model, and configuration for acctfetch.
//!
//! This crate is the foundation depended on by all other acctfetch crates.
//! It provides:
//! - [`AcctFetchError`] and [`LookupError`], the unified error types
//! - Domain types ([`RawRecord`], [`EnrichedRecord`], [`FailureRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DocumentsConfig, DocumentsKind, IdentityConfig, IdentityKind, MAX_CONCURRENCY,
    MAX_PAGE_SIZE, PipelineConfig, PipelineSection, config_dir, config_file_path, init_config,
    load_config, load_config_from, read_token,
};
pub use error::{AcctFetchError, LookupError, Result};
pub use types::{
    AggregationResult, DocumentPayload, EnrichedRecord, FailureRecord, RawRecord, RunId, UserPage,
};
