//! Google OAuth access tokens for the Sheets API.
//!
//! Three sources are supported:
//! - a static bearer token (`GOOGLE_ACCESS_TOKEN`)
//! - a service-account key file, exchanged with a signed JWT assertion
//! - an authorized-user credentials file, exchanged with its refresh token
//!
//! Exchanged tokens are cached in memory until shortly before expiry.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use leadscout_shared::{LeadScoutError, Replay, Result, RetryPolicy, Settings, send_with_retry};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are refreshed early.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Read and write access to spreadsheets, nothing else.
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google rejects assertions valid for longer than an hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// `authorized_user` credentials, as written by `gcloud auth application-default login`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// The fields of a service-account key file that the JWT grant needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

impl ServiceAccountCredentials {
    /// RS256-signed assertion asking for the Sheets scope, issued at `now`.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let failed = |what: &str, e: jsonwebtoken::errors::Error| {
            LeadScoutError::config(format!("service account {}: {what}: {e}", self.client_email))
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| failed("private key", e))?;
        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| failed("signing", e))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Debug)]
enum TokenSource {
    Static(String),
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser(AuthorizedUserCredentials),
}

/// Hands out bearer tokens for Google API calls.
#[derive(Debug)]
pub struct GoogleAuth {
    source: TokenSource,
    client: Client,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            client: Client::new(),
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn authorized_user(credentials: AuthorizedUserCredentials) -> Self {
        Self::exchanging(TokenSource::AuthorizedUser(credentials))
    }

    pub fn service_account(credentials: ServiceAccountCredentials) -> Self {
        Self::exchanging(TokenSource::ServiceAccount(credentials))
    }

    fn exchanging(source: TokenSource) -> Self {
        Self {
            source,
            client: Client::new(),
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load a `service_account` or `authorized_user` credentials file.
    ///
    /// A file without a `type` field is read as authorized-user credentials.
    pub fn from_credentials_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LeadScoutError::io(path, e))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| LeadScoutError::config(format!("{}: {e}", path.display())))?;
        let invalid =
            |e: serde_json::Error| LeadScoutError::config(format!("{}: {e}", path.display()));

        match value.get("type").and_then(|t| t.as_str()) {
            Some("service_account") => {
                let credentials: ServiceAccountCredentials =
                    serde_json::from_value(value).map_err(invalid)?;
                debug!(client_email = %credentials.client_email, "using service account");
                Ok(Self::service_account(credentials))
            }
            Some("authorized_user") | None => {
                let credentials: AuthorizedUserCredentials =
                    serde_json::from_value(value).map_err(invalid)?;
                Ok(Self::authorized_user(credentials))
            }
            Some(other) => Err(LeadScoutError::config(format!(
                "{}: credentials of type {other:?} are not supported; use a service_account or \
                 authorized_user credentials file, or set GOOGLE_ACCESS_TOKEN",
                path.display()
            ))),
        }
    }

    /// Static token when one is configured, otherwise the credentials file.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match &settings.google_access_token {
            Some(token) => Ok(Self::static_token(token.clone())),
            None => Self::from_credentials_file(&settings.credentials_path),
        }
    }

    /// A bearer token valid for at least another minute.
    pub async fn access_token(&self) -> Result<String> {
        if let TokenSource::Static(token) = &self.source {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let (token_uri, form): (&str, Vec<(&str, String)>) = match &self.source {
            TokenSource::Static(token) => {
                return Ok(CachedToken {
                    token: token.clone(),
                    expires_at: DateTime::<Utc>::MAX_UTC,
                });
            }
            TokenSource::ServiceAccount(credentials) => (
                credentials.token_uri.as_str(),
                vec![
                    ("grant_type", JWT_BEARER_GRANT.to_string()),
                    ("assertion", credentials.assertion(Utc::now())?),
                ],
            ),
            TokenSource::AuthorizedUser(credentials) => {
                let mut form = vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("client_id", credentials.client_id.clone()),
                    ("refresh_token", credentials.refresh_token.clone()),
                ];
                if let Some(secret) = &credentials.client_secret {
                    form.push(("client_secret", secret.clone()));
                }
                (credentials.token_uri.as_str(), form)
            }
        };
        debug!(%token_uri, "exchanging for a Google access token");

        let request = self.client.post(token_uri).form(&form);
        let response = send_with_retry(request, &self.retry, Replay::Idempotent).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LeadScoutError::Network(format!("token exchange: {e}")))?;
        if !status.is_success() {
            return Err(LeadScoutError::StoreIo(format!(
                "token exchange failed: HTTP {status}: {}",
                body.trim()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| LeadScoutError::parse(format!("token response: {e}")))?;
        let token = parsed["access_token"]
            .as_str()
            .ok_or_else(|| LeadScoutError::StoreIo("no access_token in token response".into()))?;
        let expires_in = parsed["expires_in"].as_i64().unwrap_or(3600);

        info!(expires_in, "obtained Google access token");
        Ok(CachedToken {
            token: token.to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}
