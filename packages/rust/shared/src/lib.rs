//! Shared types, error model, and configuration for leadscout.
//!
//! This crate is the foundation depended on by all other leadscout crates.
//! It provides:
//! - [`LeadScoutError`]: the unified fatal error type
//! - Domain types ([`SearchRequest`], [`RemoteJob`], [`RawRecord`], [`StoredLead`], [`LeadKey`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)
//! - [`send_with_retry`] for provider and spreadsheet HTTP calls

pub mod config;
pub mod error;
pub mod http;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichmentConfig, ProviderConfig, SearchConfig, Settings, StoreConfig, config_dir,
    config_file_path, load_config, load_config_from,
};
pub use error::{LeadScoutError, Result};
pub use http::{Replay, RetryPolicy, send_with_retry};
pub use types::{
    ContactSignals, EnrichedLead, HasLeadKey, JobStatus, LeadKey, RawRecord, RemoteJob,
    SearchRequest, StoredLead, non_blank, normalize_name, normalize_phone,
};
