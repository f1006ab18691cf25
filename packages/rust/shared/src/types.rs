//! Core domain types: search requests, remote jobs, scraped records and stored leads.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SearchRequest
// ---------------------------------------------------------------------------

/// What to ask the scraping provider for. Built once per run from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free-text business category, e.g. "plumber".
    pub search_term: String,
    /// Location query, e.g. "Manchester, GB".
    pub location: String,
    /// Upper bound on places the provider should crawl.
    pub max_results: u32,
    /// Result language code.
    pub language: String,
}

// ---------------------------------------------------------------------------
// RemoteJob
// ---------------------------------------------------------------------------

/// Lifecycle status of a remote scraping job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Map a provider status string (`READY`, `RUNNING`, `SUCCEEDED`, ...) onto a job status.
    ///
    /// Transitional provider states (`TIMING-OUT`, `ABORTING`) count as running;
    /// `ABORTED` counts as failed. Unknown strings are treated as still running so the
    /// poller keeps waiting rather than misreporting a terminal state.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "READY" => Self::Queued,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" | "ABORTED" => Self::Failed,
            "TIMED-OUT" | "TIMED_OUT" => Self::TimedOut,
            _ => Self::Running,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// A remote job as last observed. Only the poller updates `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    /// Opaque provider job id.
    pub id: String,
    /// Last observed status.
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// One place returned by the provider's dataset. Field names follow the provider's JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Business name.
    #[serde(rename = "title", default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Full postal address.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(rename = "categoryName", default)]
    pub category: Option<String>,
    #[serde(rename = "totalScore", default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews_count: Option<u64>,
    /// Maps listing URL.
    #[serde(rename = "url", default)]
    pub maps_url: Option<String>,
}

// ---------------------------------------------------------------------------
// ContactSignals / StoredLead
// ---------------------------------------------------------------------------

/// Contact details found on a business website.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSignals {
    pub email: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub linkedin: Option<String>,
}

impl ContactSignals {
    /// True when nothing was found.
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.instagram.is_none()
            && self.facebook.is_none()
            && self.linkedin.is_none()
    }

    /// Fill fields that are still missing from `other`, keeping what is already set.
    pub fn fill_missing(&mut self, other: ContactSignals) {
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.instagram.is_none() {
            self.instagram = other.instagram;
        }
        if self.facebook.is_none() {
            self.facebook = other.facebook;
        }
        if self.linkedin.is_none() {
            self.linkedin = other.linkedin;
        }
    }
}

/// A lead as persisted in the store: business identity plus enrichment fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredLead {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub linkedin: Option<String>,
    pub place_id: Option<String>,
    pub city: Option<String>,
    pub contact_name: Option<String>,
    pub category: Option<String>,
    pub rating: Option<String>,
    pub reviews: Option<String>,
    pub maps_url: Option<String>,
}

/// A stored lead after the enrichment pass; enrichment fields may still be empty.
pub type EnrichedLead = StoredLead;

impl StoredLead {
    /// Attach contact signals. Only the four enrichment fields are touched.
    pub fn apply_contacts(&mut self, signals: ContactSignals) {
        self.email = signals.email;
        self.instagram = signals.instagram;
        self.facebook = signals.facebook;
        self.linkedin = signals.linkedin;
    }

    /// Current enrichment fields as a [`ContactSignals`] value.
    pub fn contacts(&self) -> ContactSignals {
        ContactSignals {
            email: self.email.clone(),
            instagram: self.instagram.clone(),
            facebook: self.facebook.clone(),
            linkedin: self.linkedin.clone(),
        }
    }
}

impl From<RawRecord> for StoredLead {
    fn from(raw: RawRecord) -> Self {
        Self {
            name: raw.name.trim().to_string(),
            phone: non_blank(raw.phone),
            address: non_blank(raw.address),
            website: non_blank(raw.website),
            place_id: non_blank(raw.place_id),
            city: non_blank(raw.city),
            category: non_blank(raw.category),
            rating: raw.rating.map(|r| r.to_string()),
            reviews: raw.reviews_count.map(|n| n.to_string()),
            maps_url: non_blank(raw.maps_url),
            ..Self::default()
        }
    }
}

/// Collapse whitespace-only strings to `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Identity keys
// ---------------------------------------------------------------------------

/// Normalized identity of a lead: `(phone digits, folded name)`.
///
/// Empty components never match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LeadKey {
    pub phone: String,
    pub name: String,
}

impl LeadKey {
    pub fn new(name: &str, phone: Option<&str>) -> Self {
        Self {
            phone: phone.map(normalize_phone).unwrap_or_default(),
            name: normalize_name(name),
        }
    }
}

/// Anything that carries a business name and phone.
pub trait HasLeadKey {
    fn lead_name(&self) -> &str;
    fn lead_phone(&self) -> Option<&str>;

    fn lead_key(&self) -> LeadKey {
        LeadKey::new(self.lead_name(), self.lead_phone())
    }
}

impl HasLeadKey for RawRecord {
    fn lead_name(&self) -> &str {
        &self.name
    }

    fn lead_phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

impl HasLeadKey for StoredLead {
    fn lead_name(&self) -> &str {
        &self.name
    }

    fn lead_phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_lowercase().collect::<String>())
            } else if c.is_whitespace() {
                Some(" ".to_string())
            } else {
                None
            }
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep digits only.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}
