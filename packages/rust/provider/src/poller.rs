//! Remote job state machine.
//!
//! A job moves `Started → Polling → Succeeded | Failed | TimedOut`. Each call to
//! [`JobPoller::poll_once`] makes exactly one read-only status request and at most
//! one sleep, so the whole lifecycle can be driven with a [`ManualClock`] in tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use leadscout_shared::{JobStatus, LeadScoutError, RemoteJob, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::{DATASET_PAGE_SIZE, RunSnapshot, SearchProvider};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for the poller.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when slept on. Sleeping returns immediately.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Move time forward without counting a sleep.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// How many times `sleep` has been called.
    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}

#[async_trait]
impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// PollState
// ---------------------------------------------------------------------------

/// How often to poll and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(1800),
        }
    }
}

/// Where the poller is in a job's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Started,
    Polling { attempt: u32 },
    Succeeded { dataset_id: String },
    Failed { detail: String },
    /// Local give-up. The remote job is left running.
    TimedOut { waited: Duration },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }

    /// Turn a terminal state into the dataset id or the matching fatal error.
    fn into_result(self, job_id: &str) -> Result<String> {
        match self {
            Self::Succeeded { dataset_id } => Ok(dataset_id),
            Self::Failed { detail } => Err(LeadScoutError::RemoteJobFailed {
                job_id: job_id.to_string(),
                detail,
            }),
            Self::TimedOut { waited } => Err(LeadScoutError::RemoteJobTimedOut {
                job_id: job_id.to_string(),
                waited_secs: waited.as_secs(),
            }),
            Self::Started | Self::Polling { .. } => Err(LeadScoutError::Provider(format!(
                "job {job_id} is not in a terminal state"
            ))),
        }
    }
}

fn failure_detail(snapshot: &RunSnapshot) -> String {
    match snapshot.status_message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => format!("{}: {message}", snapshot.raw_status),
        _ => snapshot.raw_status.clone(),
    }
}

/// Items decoded from a dataset, plus how many could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetItems<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

/// Drives one remote job from start to its dataset.
pub struct JobPoller<P, C = TokioClock> {
    provider: P,
    clock: C,
    policy: PollPolicy,
    page_size: usize,
}

impl<P: SearchProvider, C: Clock> JobPoller<P, C> {
    pub fn new(provider: P, clock: C, policy: PollPolicy) -> Self {
        Self {
            provider,
            clock,
            policy,
            page_size: DATASET_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Start an actor run. This is the only mutating provider call.
    pub async fn start(&self, actor: &str, input: &serde_json::Value) -> Result<RemoteJob> {
        self.provider.start_run(actor, input).await
    }

    /// One status request. Sleeps before returning `Polling` so the next call is due.
    ///
    /// `started` is when waiting began; once the wait reaches the policy timeout the
    /// poller gives up with `TimedOut` instead of sleeping again.
    pub async fn poll_once(&self, job: &mut RemoteJob, started: Instant, attempt: u32) -> Result<PollState> {
        let snapshot = self.provider.run_status(&job.id).await?;
        job.status = snapshot.status;

        let state = match snapshot.status {
            JobStatus::Succeeded => match snapshot.dataset_id {
                Some(dataset_id) if !dataset_id.trim().is_empty() => {
                    PollState::Succeeded { dataset_id }
                }
                _ => PollState::Failed {
                    detail: "succeeded without a dataset".to_string(),
                },
            },
            JobStatus::Failed | JobStatus::TimedOut => PollState::Failed {
                detail: failure_detail(&snapshot),
            },
            JobStatus::Queued | JobStatus::Running => {
                let waited = self.clock.now().saturating_duration_since(started);
                if waited >= self.policy.timeout {
                    PollState::TimedOut { waited }
                } else {
                    let remaining = self.policy.timeout - waited;
                    self.clock.sleep(self.policy.interval.min(remaining)).await;
                    PollState::Polling { attempt }
                }
            }
        };

        debug!(job_id = %job.id, status = %job.status, ?state, "poll");
        Ok(state)
    }

    /// Poll until the job is terminal. Returns the dataset id on success.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn await_completion(&self, job: &mut RemoteJob) -> Result<String> {
        let started = self.clock.now();
        let mut state = PollState::Started;
        let mut attempt = 0u32;

        while !state.is_terminal() {
            attempt += 1;
            state = self.poll_once(job, started, attempt).await?;
        }

        match &state {
            PollState::Succeeded { dataset_id } => {
                info!(attempts = attempt, dataset_id = %dataset_id, "remote job succeeded");
            }
            PollState::Failed { detail } => warn!(attempts = attempt, %detail, "remote job failed"),
            PollState::TimedOut { waited } => {
                warn!(attempts = attempt, waited_secs = waited.as_secs(), "gave up waiting for remote job");
            }
            PollState::Started | PollState::Polling { .. } => {}
        }
        state.into_result(&job.id)
    }

    /// Page through a dataset until a short page. Undecodable items are skipped.
    #[instrument(skip(self))]
    pub async fn fetch_dataset<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<DatasetItems<T>> {
        let mut items = Vec::new();
        let mut skipped = 0usize;
        let mut offset = 0usize;

        loop {
            let page = self
                .provider
                .dataset_page(dataset_id, offset, self.page_size)
                .await?;
            let fetched = page.len();

            for value in page {
                match serde_json::from_value::<T>(value) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        skipped += 1;
                        warn!(dataset_id, error = %e, "skipping undecodable dataset item");
                    }
                }
            }

            offset += fetched;
            if fetched < self.page_size {
                break;
            }
        }

        info!(dataset_id, items = items.len(), skipped, "fetched dataset");
        Ok(DatasetItems { items, skipped })
    }
}
