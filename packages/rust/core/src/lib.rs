//! Lead reconciliation: the main scrape → dedupe → enrich → append pipeline,
//! plus the maintenance passes that work directly on the store.

pub mod dedupe;
pub mod emails;
pub mod import;
pub mod maintenance;
pub mod pipeline;
