//! The main run: search → wait → dedupe → enrich → append.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Span, info, instrument};
use uuid::Uuid;

use leadscout_crawler::{
    ContactSource, EnrichProgress, EnrichmentOutcome, EnrichmentTally, enrich_leads,
};
use leadscout_provider::{
    Clock, DatasetItems, JobPoller, PLACES_ACTOR, PollPolicy, SearchProvider, places_input,
};
use leadscout_shared::{RawRecord, Result, Settings, StoredLead};
use leadscout_storage::LeadStore;

use crate::dedupe::filter_new;

/// Collaborators for one pipeline run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub provider: Arc<dyn SearchProvider>,
    pub clock: Arc<dyn Clock>,
    pub contacts: Arc<dyn ContactSource>,
    pub store: LeadStore,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub job_id: String,
    pub dataset_id: String,
    /// Records decoded from the dataset.
    pub scraped: usize,
    /// Dataset items that could not be decoded.
    pub undecodable: usize,
    /// Leads already in the store before the run.
    pub existing: usize,
    pub duplicates: usize,
    pub in_batch_duplicates: usize,
    pub unidentifiable: usize,
    pub enrichment: EnrichmentTally,
    pub appended: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each lead's enrichment finishes.
    fn lead_enriched(&self, done: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn lead_enriched(&self, _done: usize, _total: usize) {}
    fn done(&self, _report: &PipelineReport) {}
}

struct EnrichBridge<'a>(&'a dyn ProgressReporter);

impl EnrichProgress for EnrichBridge<'_> {
    fn lead_done(&self, done: usize, total: usize, _outcome: &EnrichmentOutcome) {
        self.0.lead_enriched(done, total);
    }
}

/// Run the full pipeline once.
///
/// 1. Start the places search and wait for it
/// 2. Fetch the dataset
/// 3. Read the store and keep only new leads
/// 4. Enrich the new leads from their websites
/// 5. Append them in one batch
///
/// The store is not touched until the remote job has succeeded, so a failed or
/// abandoned job never leaves a partial write.
#[instrument(skip_all, fields(run_id = tracing::field::Empty, term = %settings.search_term))]
pub async fn run_pipeline(
    deps: &PipelineDeps,
    settings: &Settings,
    progress: &dyn ProgressReporter,
) -> Result<PipelineReport> {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    Span::current().record("run_id", tracing::field::display(run_id));

    info!(location = %settings.location, max_results = settings.max_results, "starting run");

    // --- Phase 1: Remote search ---
    let poller = JobPoller::new(
        deps.provider.clone(),
        deps.clock.clone(),
        PollPolicy {
            interval: settings.poll_interval,
            timeout: settings.poll_timeout,
        },
    );

    progress.phase("Starting search");
    let mut job = poller
        .start(PLACES_ACTOR, &places_input(&settings.search_request()))
        .await?;

    progress.phase("Waiting for search results");
    let dataset_id = poller.await_completion(&mut job).await?;

    progress.phase("Fetching results");
    let DatasetItems {
        items: records,
        skipped: undecodable,
    } = poller.fetch_dataset::<RawRecord>(&dataset_id).await?;
    let scraped = records.len();

    // --- Phase 2: Dedupe ---
    progress.phase("Checking for existing leads");
    let existing = deps.store.read_leads().await?;
    let filtered = filter_new(records, &existing);
    info!(
        scraped,
        existing = existing.len(),
        new = filtered.new.len(),
        duplicates = filtered.duplicates,
        in_batch = filtered.in_batch_duplicates,
        unidentifiable = filtered.unidentifiable,
        "filtered records"
    );

    // --- Phase 3: Enrich ---
    let fresh: Vec<StoredLead> = filtered.new.into_iter().map(StoredLead::from).collect();
    let enriched = if fresh.is_empty() {
        Vec::new()
    } else {
        progress.phase("Enriching leads");
        enrich_leads(
            deps.contacts.clone(),
            fresh,
            settings.enrich_concurrency,
            &EnrichBridge(progress),
        )
        .await
    };
    let enrichment = EnrichmentTally::from_outcomes(enriched.iter().map(|(_, outcome)| outcome));
    let leads: Vec<StoredLead> = enriched.into_iter().map(|(lead, _)| lead).collect();

    // --- Phase 4: Append ---
    progress.phase("Saving leads");
    let appended = deps.store.append_leads(&leads).await?;

    let report = PipelineReport {
        run_id,
        job_id: job.id,
        dataset_id,
        scraped,
        undecodable,
        existing: existing.len(),
        duplicates: filtered.duplicates,
        in_batch_duplicates: filtered.in_batch_duplicates,
        unidentifiable: filtered.unidentifiable,
        enrichment,
        appended,
        elapsed: start.elapsed(),
    };

    info!(
        appended,
        with_email = enrichment.with_email,
        failed = enrichment.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&report);
    Ok(report)
}
