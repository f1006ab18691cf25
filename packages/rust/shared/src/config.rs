//! Application configuration for leadscout.
//!
//! An optional config file lives at `~/.leadscout/leadscout.toml`.
//! Environment variables (including those loaded from `.env`) override config file
//! values, which override defaults. The merged result is an immutable [`Settings`]
//! that is passed explicitly into every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadScoutError, Result};
use crate::types::SearchRequest;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadscout";

// ---------------------------------------------------------------------------
// Config structs (matching leadscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level file config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API token. Prefer the `APIFY_TOKEN` env var over writing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// API base URL.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Seconds between job status checks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to wait for a job before giving up.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_provider_base_url(),
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://api.apify.com/v2".into()
}
fn default_poll_interval() -> u64 {
    30
}
fn default_poll_timeout() -> u64 {
    1800
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Spreadsheet id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<String>,

    /// Worksheet (tab) holding the leads.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Path to the OAuth credentials JSON.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sheet_id: None,
            sheet_name: default_sheet_name(),
            credentials_path: default_credentials_path(),
        }
    }
}

fn default_sheet_name() -> String {
    "scraped_leads".into()
}
fn default_credentials_path() -> String {
    "credentials.json".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_term")]
    pub term: String,

    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            term: default_search_term(),
            location: default_location(),
            max_results: default_max_results(),
            language: default_language(),
        }
    }
}

fn default_search_term() -> String {
    "plumber".into()
}
fn default_location() -> String {
    "Manchester, GB".into()
}
fn default_max_results() -> u32 {
    120
}
fn default_language() -> String {
    "en".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Maximum concurrent website fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-request timeout for website fetches.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Also scan a linked contact page when the homepage has no email.
    #[serde(default = "default_true")]
    pub follow_contact_page: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            follow_contact_page: true,
        }
    }
}

fn default_concurrency() -> u32 {
    5
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Settings (runtime, merged from config file + environment)
// ---------------------------------------------------------------------------

/// Runtime settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider_token: Option<String>,
    pub provider_base_url: String,
    pub sheet_id: Option<String>,
    pub sheet_name: String,
    pub credentials_path: PathBuf,
    /// Static bearer token for the spreadsheet API; skips credential refresh when set.
    pub google_access_token: Option<String>,
    pub search_term: String,
    pub location: String,
    pub max_results: u32,
    pub language: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub enrich_concurrency: usize,
    pub fetch_timeout: Duration,
    pub follow_contact_page: bool,
}

impl Settings {
    /// Merge the file config with variables from the process environment.
    pub fn from_env(file: &AppConfig) -> Result<Self> {
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge the file config with variables looked up through `env`.
    pub fn resolve(file: &AppConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_interval_secs = parse_var(&var, "POLL_INTERVAL")?
            .unwrap_or(file.provider.poll_interval_secs);
        if poll_interval_secs == 0 {
            return Err(LeadScoutError::config("POLL_INTERVAL must be at least 1 second"));
        }

        let enrich_concurrency: u32 = parse_var(&var, "ENRICH_CONCURRENCY")?
            .unwrap_or(file.enrichment.concurrency);
        if enrich_concurrency == 0 {
            return Err(LeadScoutError::config("ENRICH_CONCURRENCY must be at least 1"));
        }

        Ok(Self {
            provider_token: var("APIFY_TOKEN").or_else(|| file.provider.token.clone()),
            provider_base_url: var("APIFY_BASE_URL")
                .unwrap_or_else(|| file.provider.base_url.clone()),
            sheet_id: var("GOOGLE_SHEET_ID").or_else(|| file.store.sheet_id.clone()),
            sheet_name: var("GOOGLE_SHEET_NAME").unwrap_or_else(|| file.store.sheet_name.clone()),
            credentials_path: PathBuf::from(
                var("GOOGLE_CREDENTIALS").unwrap_or_else(|| file.store.credentials_path.clone()),
            ),
            google_access_token: var("GOOGLE_ACCESS_TOKEN"),
            search_term: var("SEARCH_TERM").unwrap_or_else(|| file.search.term.clone()),
            location: var("LOCATION").unwrap_or_else(|| file.search.location.clone()),
            max_results: parse_var(&var, "MAX_RESULTS")?.unwrap_or(file.search.max_results),
            language: var("SEARCH_LANGUAGE").unwrap_or_else(|| file.search.language.clone()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            poll_timeout: Duration::from_secs(
                parse_var(&var, "POLL_TIMEOUT")?.unwrap_or(file.provider.poll_timeout_secs),
            ),
            enrich_concurrency: enrich_concurrency as usize,
            fetch_timeout: Duration::from_secs(
                parse_var(&var, "FETCH_TIMEOUT")?.unwrap_or(file.enrichment.fetch_timeout_secs),
            ),
            follow_contact_page: file.enrichment.follow_contact_page,
        })
    }

    /// The provider token, or a config error naming the missing variable.
    pub fn require_provider_token(&self) -> Result<&str> {
        self.provider_token.as_deref().ok_or_else(|| {
            LeadScoutError::config(
                "provider token not found. Set the APIFY_TOKEN environment variable \
                 or [provider].token in the config file",
            )
        })
    }

    /// The spreadsheet id, or a config error naming the missing variable.
    pub fn require_sheet_id(&self) -> Result<&str> {
        self.sheet_id.as_deref().ok_or_else(|| {
            LeadScoutError::config(
                "spreadsheet id not found. Set the GOOGLE_SHEET_ID environment variable \
                 or [store].sheet_id in the config file",
            )
        })
    }

    /// The search this run should start.
    pub fn search_request(&self) -> SearchRequest {
        SearchRequest {
            search_term: self.search_term.clone(),
            location: self.location.clone(),
            max_results: self.max_results,
            language: self.language.clone(),
        }
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| LeadScoutError::config(format!("{key}={raw:?} is not valid: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadscout/leadscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the file config from the default location. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the file config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}
