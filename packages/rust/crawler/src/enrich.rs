//! Bounded, failure-isolated enrichment pass over new leads.

use std::sync::Arc;

use leadscout_shared::{ContactSignals, EnrichedLead, StoredLead};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::fetch::{ContactSource, EnrichmentFetchError, normalize_website};

/// Why a lead was not looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoWebsite,
    InvalidWebsite(String),
    BlockedHost(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWebsite => f.write_str("no website"),
            Self::InvalidWebsite(raw) => write!(f, "unparseable website {raw:?}"),
            Self::BlockedHost(host) => write!(f, "local or private host {host}"),
        }
    }
}

/// Result of enriching one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// The site was read. Signals may still be empty.
    Enriched(ContactSignals),
    Skipped(SkipReason),
    Failed(EnrichmentFetchError),
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentTally {
    pub enriched: usize,
    pub with_email: usize,
    pub with_social: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl EnrichmentTally {
    pub fn record(&mut self, outcome: &EnrichmentOutcome) {
        match outcome {
            EnrichmentOutcome::Enriched(signals) => {
                self.enriched += 1;
                if signals.email.is_some() {
                    self.with_email += 1;
                }
                if signals.instagram.is_some()
                    || signals.facebook.is_some()
                    || signals.linkedin.is_some()
                {
                    self.with_social += 1;
                }
            }
            EnrichmentOutcome::Skipped(_) => self.skipped += 1,
            EnrichmentOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a EnrichmentOutcome>) -> Self {
        let mut tally = Self::default();
        for outcome in outcomes {
            tally.record(outcome);
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.enriched + self.skipped + self.failed
    }
}

/// Receives per-lead progress while a batch runs.
pub trait EnrichProgress: Send + Sync {
    fn lead_done(&self, done: usize, total: usize, outcome: &EnrichmentOutcome);
}

/// Progress sink that ignores everything.
pub struct NoProgress;

impl EnrichProgress for NoProgress {
    fn lead_done(&self, _done: usize, _total: usize, _outcome: &EnrichmentOutcome) {}
}

/// Enrich a single lead. Never fails: problems become `Skipped` or `Failed`
/// and the lead comes back with its enrichment fields empty.
pub async fn enrich_lead(source: &dyn ContactSource, mut lead: StoredLead) -> (EnrichedLead, EnrichmentOutcome) {
    let Some(raw) = lead.website.clone() else {
        lead.apply_contacts(ContactSignals::default());
        return (lead, EnrichmentOutcome::Skipped(SkipReason::NoWebsite));
    };
    let Some(url) = normalize_website(&raw) else {
        debug!(name = %lead.name, website = %raw, "unparseable website");
        lead.apply_contacts(ContactSignals::default());
        return (lead, EnrichmentOutcome::Skipped(SkipReason::InvalidWebsite(raw)));
    };

    match source.contacts(&url).await {
        Ok(signals) => {
            debug!(name = %lead.name, found = !signals.is_empty(), "enriched");
            lead.apply_contacts(signals.clone());
            (lead, EnrichmentOutcome::Enriched(signals))
        }
        Err(EnrichmentFetchError::Blocked(host)) => {
            debug!(name = %lead.name, %host, "skipping local website");
            lead.apply_contacts(ContactSignals::default());
            (lead, EnrichmentOutcome::Skipped(SkipReason::BlockedHost(host)))
        }
        Err(e) => {
            warn!(name = %lead.name, website = %url, error = %e, "enrichment failed");
            lead.apply_contacts(ContactSignals::default());
            (lead, EnrichmentOutcome::Failed(e))
        }
    }
}

/// Enrich `leads` with at most `concurrency` lookups in flight.
///
/// Output order matches input order. A lead whose task dies still comes back,
/// unenriched, tagged `Failed`.
#[instrument(skip_all, fields(leads = leads.len(), concurrency = concurrency))]
pub async fn enrich_leads(
    source: Arc<dyn ContactSource>,
    leads: Vec<StoredLead>,
    concurrency: usize,
    progress: &dyn EnrichProgress,
) -> Vec<(EnrichedLead, EnrichmentOutcome)> {
    let total = leads.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut handles = Vec::with_capacity(total);
    for lead in leads {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let fallback = lead.clone();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed; a failed acquire just runs unthrottled.
            let _permit = sem.acquire_owned().await.ok();
            enrich_lead(source.as_ref(), lead).await
        });
        handles.push((handle, fallback));
    }

    let mut results = Vec::with_capacity(total);
    let mut tally = EnrichmentTally::default();
    for (done, (handle, mut fallback)) in handles.into_iter().enumerate() {
        let (lead, outcome) = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(name = %fallback.name, error = %e, "enrichment task failed");
                fallback.apply_contacts(ContactSignals::default());
                (
                    fallback,
                    EnrichmentOutcome::Failed(EnrichmentFetchError::Aborted(e.to_string())),
                )
            }
        };
        tally.record(&outcome);
        progress.lead_done(done + 1, total, &outcome);
        results.push((lead, outcome));
    }

    info!(
        enriched = tally.enriched,
        with_email = tally.with_email,
        skipped = tally.skipped,
        failed = tally.failed,
        "enrichment pass finished"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    /// Answers from the URL's host and tracks how many lookups overlap.
    struct FakeSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContactSource for FakeSource {
        async fn contacts(&self, website: &Url) -> Result<ContactSignals, EnrichmentFetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let host = website.host_str().unwrap_or_default();
            match host {
                "slow.example.org" => Err(EnrichmentFetchError::Timeout),
                "panic.example.org" => panic!("boom"),
                _ => Ok(ContactSignals {
                    email: Some(format!("info@{host}")),
                    ..ContactSignals::default()
                }),
            }
        }
    }

    struct Recorder(Mutex<Vec<(usize, usize)>>);

    impl EnrichProgress for Recorder {
        fn lead_done(&self, done: usize, total: usize, _outcome: &EnrichmentOutcome) {
            self.0.lock().unwrap().push((done, total));
        }
    }

    fn lead(name: &str, website: Option<&str>) -> StoredLead {
        StoredLead {
            name: name.into(),
            phone: Some("0161 555 0100".into()),
            address: Some("1 High St".into()),
            place_id: Some(format!("place-{name}")),
            website: website.map(String::from),
            ..StoredLead::default()
        }
    }

    #[tokio::test]
    async fn no_website_is_skipped_with_empty_fields() {
        let source = FakeSource::new();
        let mut input = lead("Acme", None);
        input.email = Some("stale@acme.com".into());

        let (out, outcome) = enrich_lead(&source, input).await;
        assert_eq!(outcome, EnrichmentOutcome::Skipped(SkipReason::NoWebsite));
        assert!(out.contacts().is_empty());
        assert_eq!(source.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_website_is_skipped() {
        let (out, outcome) = enrich_lead(&FakeSource::new(), lead("Acme", Some("n/a"))).await;
        assert!(matches!(
            outcome,
            EnrichmentOutcome::Skipped(SkipReason::InvalidWebsite(_))
        ));
        assert!(out.contacts().is_empty());
    }

    #[tokio::test]
    async fn fetch_timeout_leaves_identity_untouched() {
        let input = lead("Slow Co", Some("slow.example.org"));
        let (out, outcome) = enrich_lead(&FakeSource::new(), input.clone()).await;

        assert_eq!(outcome, EnrichmentOutcome::Failed(EnrichmentFetchError::Timeout));
        assert!(out.contacts().is_empty());
        assert_eq!(out.name, input.name);
        assert_eq!(out.phone, input.phone);
        assert_eq!(out.address, input.address);
        assert_eq!(out.place_id, input.place_id);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_bounds_concurrency() {
        let source = Arc::new(FakeSource::new());
        let leads: Vec<_> = (0..8)
            .map(|i| lead(&format!("Biz {i}"), Some(&format!("biz{i}.example.org"))))
            .collect();
        let recorder = Recorder(Mutex::new(Vec::new()));

        let results = enrich_leads(source.clone(), leads, 3, &recorder).await;

        let names: Vec<_> = results.iter().map(|(l, _)| l.name.clone()).collect();
        let expected: Vec<_> = (0..8).map(|i| format!("Biz {i}")).collect();
        assert_eq!(names, expected);
        assert_eq!(
            results[5].0.email.as_deref(),
            Some("info@biz5.example.org")
        );
        assert!(source.peak.load(Ordering::SeqCst) <= 3);

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 8);
        assert_eq!(seen.last(), Some(&(8, 8)));
    }

    #[tokio::test]
    async fn one_bad_lead_does_not_sink_the_batch() {
        let source: Arc<dyn ContactSource> = Arc::new(FakeSource::new());
        let leads = vec![
            lead("Good", Some("good.example.org")),
            lead("Broken", Some("panic.example.org")),
            lead("Slow", Some("slow.example.org")),
            lead("Bare", None),
        ];

        let results = enrich_leads(source, leads, 2, &NoProgress).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].0.name, "Broken");
        assert!(matches!(
            results[1].1,
            EnrichmentOutcome::Failed(EnrichmentFetchError::Aborted(_))
        ));

        let tally = EnrichmentTally::from_outcomes(results.iter().map(|(_, o)| o));
        assert_eq!(
            tally,
            EnrichmentTally {
                enriched: 1,
                with_email: 1,
                with_social: 0,
                skipped: 1,
                failed: 2,
            }
        );
        assert_eq!(tally.total(), 4);
    }
}
