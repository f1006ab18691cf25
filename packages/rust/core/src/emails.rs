//! Email validation: address syntax, then the domain's MX records.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;

static EMAIL_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Why an address was rejected. Recovered by leaving it out of the valid set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailValidationError {
    #[error("malformed address")]
    Format,

    #[error("domain {0} has no MX records")]
    NoMx(String),

    #[error("MX lookup for {domain} failed: {detail}")]
    Lookup { domain: String, detail: String },
}

/// Result of checking one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailCheck {
    Valid,
    Invalid(EmailValidationError),
}

impl EmailCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Answers whether a domain accepts mail.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// `Ok(false)` when the domain has no MX records or does not exist.
    async fn has_mx(&self, domain: &str) -> Result<bool, EmailValidationError>;
}

/// MX lookups through the system resolver.
pub struct DnsMxLookup {
    resolver: TokioAsyncResolver,
}

impl DnsMxLookup {
    /// Use the system resolver configuration, or public defaults when it cannot be read.
    pub fn from_system() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "system DNS config unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self { resolver }
    }
}

#[async_trait]
impl MxLookup for DnsMxLookup {
    async fn has_mx(&self, domain: &str) -> Result<bool, EmailValidationError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(false),
                _ => Err(EmailValidationError::Lookup {
                    domain: domain.to_string(),
                    detail: e.to_string(),
                }),
            },
        }
    }
}

/// Checks addresses, caching the MX answer per domain within one report.
pub struct EmailValidator {
    lookup: Arc<dyn MxLookup>,
}

impl EmailValidator {
    pub fn new(lookup: Arc<dyn MxLookup>) -> Self {
        Self { lookup }
    }

    pub fn with_system_dns() -> Self {
        Self::new(Arc::new(DnsMxLookup::from_system()))
    }

    /// Syntax only.
    pub fn is_well_formed(email: &str) -> bool {
        EMAIL_FORMAT.is_match(email)
    }

    pub async fn check(&self, email: &str) -> EmailCheck {
        let email = email.trim();
        if !Self::is_well_formed(email) {
            return EmailCheck::Invalid(EmailValidationError::Format);
        }
        let Some((_, domain)) = email.rsplit_once('@') else {
            return EmailCheck::Invalid(EmailValidationError::Format);
        };
        self.check_domain(&domain.to_ascii_lowercase()).await
    }

    async fn check_domain(&self, domain: &str) -> EmailCheck {
        match self.lookup.has_mx(domain).await {
            Ok(true) => EmailCheck::Valid,
            Ok(false) => EmailCheck::Invalid(EmailValidationError::NoMx(domain.to_string())),
            Err(e) => EmailCheck::Invalid(e),
        }
    }

    /// Check every distinct address in `emails`. Blank entries are ignored.
    pub async fn report<'a>(&self, emails: impl IntoIterator<Item = &'a str>) -> EmailReport {
        let unique: BTreeSet<String> = emails
            .into_iter()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        let mut domains: HashMap<String, EmailCheck> = HashMap::new();
        let mut report = EmailReport::default();

        for email in unique {
            let check = if !Self::is_well_formed(&email) {
                EmailCheck::Invalid(EmailValidationError::Format)
            } else {
                let domain = email
                    .rsplit_once('@')
                    .map(|(_, d)| d.to_ascii_lowercase())
                    .unwrap_or_default();
                match domains.get(&domain) {
                    Some(check) => check.clone(),
                    None => {
                        let check = self.check_domain(&domain).await;
                        domains.insert(domain, check.clone());
                        check
                    }
                }
            };

            match check {
                EmailCheck::Valid => {
                    debug!(%email, "valid");
                    report.valid.push(email);
                }
                EmailCheck::Invalid(reason) => {
                    debug!(%email, %reason, "invalid");
                    report.invalid.push((email, reason));
                }
            }
        }

        report
    }
}

/// Distinct addresses split by verdict, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailReport {
    pub valid: Vec<String>,
    pub invalid: Vec<(String, EmailValidationError)>,
}

impl EmailReport {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }
}
