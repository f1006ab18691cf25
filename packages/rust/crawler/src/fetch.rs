//! Website fetching for contact enrichment.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use leadscout_shared::{ContactSignals, LeadScoutError, Result};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::extract::scan_page;

/// User-Agent string for website requests.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; leadscout/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Why a website could not be read. Recovered per lead; never ends a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentFetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read body: {0}")]
    Body(String),

    /// Private, loopback or otherwise local host.
    #[error("refusing to fetch local or private host {0}")]
    Blocked(String),

    /// The enrichment task itself died.
    #[error("enrichment task aborted: {0}")]
    Aborted(String),
}

/// Something that can look up contact signals for a website.
#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn contacts(&self, website: &Url) -> std::result::Result<ContactSignals, EnrichmentFetchError>;
}

/// Turn a stored website value into a fetchable URL.
///
/// Adds `https://` when the scheme is missing. Returns `None` for anything that
/// is not an http(s) URL with a dotted host.
pub fn normalize_website(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    (host.contains('.') || host.parse::<IpAddr>().is_ok() || host == "localhost").then_some(url)
}

/// Fetches a business homepage (and optionally its contact page) and extracts signals.
pub struct ContactScraper {
    client: Client,
    follow_contact_page: bool,
    /// Allow localhost/private IPs (for tests against local mock servers).
    allow_localhost: bool,
}

impl ContactScraper {
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| LeadScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            follow_contact_page: true,
            allow_localhost: false,
        })
    }

    pub fn follow_contact_page(mut self, follow: bool) -> Self {
        self.follow_contact_page = follow;
        self
    }

    /// Allow fetching localhost/private IPs.
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    async fn fetch_html(&self, url: &Url) -> std::result::Result<String, EnrichmentFetchError> {
        if !self.allow_localhost && is_ssrf_target(url) {
            return Err(EnrichmentFetchError::Blocked(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }

        debug!(%url, "fetching website");
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentFetchError::Timeout
            } else {
                EnrichmentFetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentFetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentFetchError::Timeout
            } else {
                EnrichmentFetchError::Body(e.to_string())
            }
        })
    }
}

#[async_trait]
impl ContactSource for ContactScraper {
    #[instrument(skip_all, fields(website = %website))]
    async fn contacts(&self, website: &Url) -> std::result::Result<ContactSignals, EnrichmentFetchError> {
        let html = self.fetch_html(website).await?;
        let page = scan_page(&html, website);
        let mut signals = page.signals;

        if signals.email.is_none() && self.follow_contact_page {
            if let Some(contact_url) = page.contact_page {
                match self.fetch_html(&contact_url).await {
                    Ok(html) => signals.fill_missing(scan_page(&html, &contact_url).signals),
                    Err(e) => debug!(url = %contact_url, error = %e, "contact page unavailable"),
                }
            }
        }

        Ok(signals)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Whether a URL points somewhere we should never fetch from a lead's website field.
pub(crate) fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10
                || (a == 100 && (b & 0xC0) == 64)
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 and fe80::/10
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper() -> ContactScraper {
        ContactScraper::new(Duration::from_secs(2))
            .unwrap()
            .allow_localhost()
    }

    #[test]
    fn normalize_adds_scheme() {
        assert_eq!(
            normalize_website("joes.com").unwrap().as_str(),
            "https://joes.com/"
        );
        assert_eq!(
            normalize_website(" http://acme.co.uk/about ").unwrap().as_str(),
            "http://acme.co.uk/about"
        );
        assert!(normalize_website("").is_none());
        assert!(normalize_website("not a website").is_none());
        assert!(normalize_website("ftp://files.acme.com").is_none());
    }

    #[test]
    fn ssrf_blocks_private_and_local() {
        for url in [
            "http://127.0.0.1/",
            "http://10.0.0.5/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://localhost:8080/",
            "http://printer.local/",
            "http://[::1]/",
        ] {
            assert!(is_ssrf_target(&Url::parse(url).unwrap()), "{url}");
        }
        assert!(!is_ssrf_target(&Url::parse("https://acme.co.uk/").unwrap()));
    }

    #[tokio::test]
    async fn blocked_host_is_not_fetched() {
        let scraper = ContactScraper::new(Duration::from_secs(2)).unwrap();
        let err = scraper
            .contacts(&Url::parse("http://127.0.0.1:9/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentFetchError::Blocked(_)));
    }

    #[tokio::test]
    async fn follows_contact_page_when_homepage_has_no_email() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                    <a href="https://facebook.com/acmeplumbing">fb</a>
                    <a href="/contact">Contact</a>
                </body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                    <p>hello@acmeplumbing.com</p>
                    <a href="https://facebook.com/someoneelse">fb</a>
                </body></html>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let signals = scraper().contacts(&site).await.unwrap();
        assert_eq!(signals.email.as_deref(), Some("hello@acmeplumbing.com"));
        // Homepage value is kept.
        assert_eq!(
            signals.facebook.as_deref(),
            Some("https://facebook.com/acmeplumbing")
        );
    }

    #[tokio::test]
    async fn contact_page_skipped_when_email_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="mailto:jo@acme.com">mail</a><a href="/contact">Contact</a>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(path("/contact"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let signals = scraper().contacts(&site).await.unwrap();
        assert_eq!(signals.email.as_deref(), Some("jo@acme.com"));
    }

    #[tokio::test]
    async fn error_status_is_fetch_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let err = scraper().contacts(&site).await.unwrap_err();
        assert_eq!(err, EnrichmentFetchError::Status(503));
    }

    #[tokio::test]
    async fn slow_site_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>late@acme.com</p>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let scraper = ContactScraper::new(Duration::from_millis(200))
            .unwrap()
            .allow_localhost();
        let site = Url::parse(&server.uri()).unwrap();
        let err = scraper.contacts(&site).await.unwrap_err();
        assert_eq!(err, EnrichmentFetchError::Timeout);
    }
}
