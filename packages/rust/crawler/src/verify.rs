//! Social link verification.
//!
//! A profile link is considered dead when the platform answers with an error
//! status or bounces the request to a login page or its own home page.

use std::time::Duration;

use leadscout_shared::{LeadScoutError, Result};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Platforms whose links can be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Instagram,
    Facebook,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
        }
    }

    fn domain(self) -> &'static str {
        match self {
            Self::Instagram => "instagram.com",
            Self::Facebook => "facebook.com",
        }
    }

    fn is_login(self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        match self {
            Self::Instagram => path.contains("accounts/login"),
            Self::Facebook => path.contains("login"),
        }
    }

    fn is_home(self, url: &Url) -> bool {
        let on_platform = url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            host == self.domain() || host.ends_with(&format!(".{}", self.domain()))
        });
        on_platform && url.path().trim_matches('/').is_empty()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a link was judged invalid. Recovered by clearing the field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidLink {
    #[error("unparseable link")]
    Unparseable,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("redirected to login page {0}")]
    LoginRedirect(String),

    #[error("redirected to platform home page")]
    HomeRedirect,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Checks social profile links with a HEAD request that follows redirects.
pub struct LinkVerifier {
    client: Client,
}

impl LinkVerifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|e| LeadScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// `Ok(())` when the link still resolves to a real profile.
    pub async fn verify(&self, platform: Platform, link: &str) -> std::result::Result<(), InvalidLink> {
        let url = parse_link(link).ok_or(InvalidLink::Unparseable)?;

        let response = self.client.head(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                InvalidLink::Timeout
            } else {
                InvalidLink::Transport(e.to_string())
            }
        });
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(%platform, link, error = %e, "link check failed");
                return Err(e);
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let verdict = if !status.is_success() {
            Err(InvalidLink::Status(status.as_u16()))
        } else if platform.is_login(&final_url) {
            Err(InvalidLink::LoginRedirect(final_url.to_string()))
        } else if platform.is_home(&final_url) {
            Err(InvalidLink::HomeRedirect)
        } else {
            Ok(())
        };

        match &verdict {
            Ok(()) => debug!(%platform, link, "link is valid"),
            Err(e) => warn!(%platform, link, reason = %e, "link is invalid"),
        }
        verdict
    }
}

fn parse_link(link: &str) -> Option<Url> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Url::parse(&candidate)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier() -> LinkVerifier {
        LinkVerifier::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn login_redirect_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/ghost.account"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/accounts/login/?next=/ghost.account/"),
            )
            .mount(&server)
            .await;

        Mock::given(path("/accounts/login/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let link = format!("{}/ghost.account", server.uri());
        let err = verifier()
            .verify(Platform::Instagram, &link)
            .await
            .unwrap_err();
        assert!(matches!(err, InvalidLink::LoginRedirect(_)), "{err:?}");
    }

    #[tokio::test]
    async fn facebook_login_checkpoint_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/SomeBusiness"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/login.php"))
            .mount(&server)
            .await;

        Mock::given(path("/login.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let link = format!("{}/SomeBusiness", server.uri());
        assert!(verifier().verify(Platform::Facebook, &link).await.is_err());
    }

    #[tokio::test]
    async fn not_found_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let link = format!("{}/gone", server.uri());
        assert_eq!(
            verifier().verify(Platform::Facebook, &link).await,
            Err(InvalidLink::Status(404))
        );
    }

    #[tokio::test]
    async fn redirect_without_location_is_invalid() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/cached"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let moved = format!("{}/moved", server.uri());
        assert_eq!(
            verifier().verify(Platform::Instagram, &moved).await,
            Err(InvalidLink::Status(302))
        );
        let cached = format!("{}/cached", server.uri());
        assert_eq!(
            verifier().verify(Platform::Facebook, &cached).await,
            Err(InvalidLink::Status(304))
        );
    }

    #[tokio::test]
    async fn live_profile_is_valid() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/acmeplumbing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let link = format!("{}/acmeplumbing", server.uri());
        assert_eq!(verifier().verify(Platform::Instagram, &link).await, Ok(()));
    }

    #[tokio::test]
    async fn blank_link_is_unparseable() {
        assert_eq!(
            verifier().verify(Platform::Instagram, "   ").await,
            Err(InvalidLink::Unparseable)
        );
    }

    #[test]
    fn home_page_detection() {
        let home = Url::parse("https://www.instagram.com/").unwrap();
        let profile = Url::parse("https://www.instagram.com/acme/").unwrap();
        let other = Url::parse("https://example.org/").unwrap();
        assert!(Platform::Instagram.is_home(&home));
        assert!(!Platform::Instagram.is_home(&profile));
        assert!(!Platform::Instagram.is_home(&other));
        assert!(!Platform::Facebook.is_home(&home));
    }

    #[test]
    fn facebook_login_check_ignores_handle() {
        let page = Url::parse("https://facebook.com/bloginsider").unwrap();
        let login = Url::parse("https://www.facebook.com/login/?next=x").unwrap();
        assert!(!Platform::Facebook.is_login(&page));
        assert!(Platform::Facebook.is_login(&login));
    }
}
