//! Website crawling for lead enrichment.
//!
//! This crate provides:
//! - [`extract`]: contact-signal extraction from HTML (email, Instagram, Facebook, LinkedIn)
//! - [`ContactScraper`]: fetches a lead's homepage, and its contact page when needed
//! - [`enrich_leads`]: bounded, order-preserving, failure-isolated enrichment pass
//! - [`LinkVerifier`]: checks stored social links still resolve to a profile

pub mod extract;
mod enrich;
mod fetch;
mod verify;

pub use enrich::{
    EnrichProgress, EnrichmentOutcome, EnrichmentTally, NoProgress, SkipReason, enrich_lead,
    enrich_leads,
};
pub use extract::{ScannedPage, scan_page};
pub use fetch::{ContactScraper, ContactSource, EnrichmentFetchError, normalize_website};
pub use verify::{InvalidLink, LinkVerifier, Platform};
