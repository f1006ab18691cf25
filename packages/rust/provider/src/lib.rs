//! Scraping-provider client and remote job polling.
//!
//! Searches run as asynchronous actor jobs on the provider. We start a run, poll it
//! until it reaches a terminal status, then page through the dataset it produced.
//!
//! - [`SearchProvider`]: the three provider calls the poller needs
//! - [`ApifyClient`]: HTTP implementation against the Apify v2 API
//! - [`JobPoller`]: the start → poll → fetch state machine
//! - [`reviews`]: review scraping for known place ids

mod poller;
pub mod reviews;

use std::time::Duration;

use async_trait::async_trait;
use leadscout_shared::{
    JobStatus, LeadScoutError, RemoteJob, Replay, Result, RetryPolicy, SearchRequest,
    send_with_retry,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

pub use poller::{Clock, DatasetItems, JobPoller, ManualClock, PollPolicy, PollState, TokioClock};
pub use reviews::{PlaceReviews, Review, ReviewRequest, ReviewsByPlace, fetch_reviews};

/// Actor that scrapes map listings for a search term and location.
pub const PLACES_ACTOR: &str = "compass~crawler-google-places";

/// Number of dataset items requested per page.
pub const DATASET_PAGE_SIZE: usize = 1000;

/// Default timeout in seconds for provider API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("leadscout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// SearchProvider
// ---------------------------------------------------------------------------

/// One observation of a remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub status: JobStatus,
    /// Status string exactly as the provider reported it.
    pub raw_status: String,
    /// Dataset holding the run's results, once known.
    pub dataset_id: Option<String>,
    /// Human-readable status or error message from the provider.
    pub status_message: Option<String>,
}

/// The provider calls the poller depends on.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Start an actor run with the given input; returns the new job.
    async fn start_run(&self, actor: &str, input: &serde_json::Value) -> Result<RemoteJob>;

    /// Read-only status check for a run.
    async fn run_status(&self, job_id: &str) -> Result<RunSnapshot>;

    /// One page of dataset items.
    async fn dataset_page(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
impl<T: SearchProvider + ?Sized> SearchProvider for std::sync::Arc<T> {
    async fn start_run(&self, actor: &str, input: &serde_json::Value) -> Result<RemoteJob> {
        (**self).start_run(actor, input).await
    }

    async fn run_status(&self, job_id: &str) -> Result<RunSnapshot> {
        (**self).run_status(job_id).await
    }

    async fn dataset_page(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>> {
        (**self).dataset_page(dataset_id, offset, limit).await
    }
}

/// Actor input for a places search.
pub fn places_input(request: &SearchRequest) -> serde_json::Value {
    serde_json::json!({
        "searchStringsArray": [request.search_term],
        "locationQuery": request.location,
        "maxCrawledPlacesPerSearch": request.max_results,
        "language": request.language,
        "maximumLeadsEnrichmentRecords": 0,
        "maxImages": 0,
    })
}

// ---------------------------------------------------------------------------
// ApifyClient
// ---------------------------------------------------------------------------

/// `{"data": {...}}` envelope used by run endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunData {
    id: String,
    status: String,
    #[serde(default)]
    default_dataset_id: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
}

/// HTTP client for the Apify v2 API.
pub struct ApifyClient {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl ApifyClient {
    /// Create a client for `base_url` (e.g. `https://api.apify.com/v2`).
    pub fn new(token: &str, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LeadScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (tests use [`RetryPolicy::none`]).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        replay: Replay,
        what: &str,
    ) -> Result<reqwest::Response> {
        let response =
            send_with_retry(request.bearer_auth(&self.token), &self.retry, replay).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadScoutError::Provider(format!(
                "{what}: HTTP {status}: {}",
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn run_data(&self, response: reqwest::Response, what: &str) -> Result<RunData> {
        let envelope: Envelope<RunData> = response
            .json()
            .await
            .map_err(|e| LeadScoutError::parse(format!("{what}: {e}")))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl SearchProvider for ApifyClient {
    /// Only a refused connection is retried: every accepted POST is a new run.
    #[instrument(skip_all, fields(actor = %actor))]
    async fn start_run(&self, actor: &str, input: &serde_json::Value) -> Result<RemoteJob> {
        let url = format!("{}/acts/{actor}/runs", self.base_url);
        let response = self
            .send(
                self.client.post(&url).json(input),
                Replay::ConnectOnly,
                "start run",
            )
            .await?;
        let data = self.run_data(response, "start run").await?;

        info!(job_id = %data.id, status = %data.status, "started remote job");
        Ok(RemoteJob {
            id: data.id,
            status: JobStatus::from_provider(&data.status),
        })
    }

    async fn run_status(&self, job_id: &str) -> Result<RunSnapshot> {
        let url = format!("{}/actor-runs/{job_id}", self.base_url);
        let response = self
            .send(self.client.get(&url), Replay::Idempotent, "run status")
            .await?;
        let data = self.run_data(response, "run status").await?;

        debug!(job_id, status = %data.status, "polled remote job");
        Ok(RunSnapshot {
            status: JobStatus::from_provider(&data.status),
            raw_status: data.status,
            dataset_id: data.default_dataset_id,
            status_message: data.status_message,
        })
    }

    async fn dataset_page(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/datasets/{dataset_id}/items", self.base_url);
        let request = self.client.get(&url).query(&[
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("clean", "true".to_string()),
            ("format", "json".to_string()),
        ]);
        let response = self
            .send(request, Replay::Idempotent, "dataset items")
            .await?;

        response
            .json()
            .await
            .map_err(|e| LeadScoutError::parse(format!("dataset {dataset_id}: {e}")))
    }
}
