//! Contact-signal extraction from a fetched HTML page.
//!
//! Email: `mailto:` anchors first, then a pattern scan over the raw body. Social
//! links: anchors first, then the raw body. The first hit of each kind wins.

use std::sync::LazyLock;

use leadscout_shared::ContactSignals;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("email pattern")
});

static INSTAGRAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?instagram\.com/([a-z0-9._]+)").expect("instagram pattern")
});

static FACEBOOK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.|m\.)?facebook\.com/([a-z0-9._-]+)").expect("facebook pattern")
});

static LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/(company|in)/([a-z0-9._%-]+)")
        .expect("linkedin pattern")
});

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

/// File extensions that show up in `name@2x.png` style asset names.
const ASSET_SUFFIXES: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "css", "js",
];

/// Placeholder or tracking domains that are never a business inbox.
const IGNORED_EMAIL_DOMAINS: &[&str] = &["example.com", "domain.com", "sentry.io", "wixpress.com"];

const INSTAGRAM_RESERVED: &[&str] = &[
    "p", "reel", "reels", "explore", "accounts", "stories", "tv", "share", "about", "developer",
];

const FACEBOOK_RESERVED: &[&str] = &[
    "sharer", "sharer.php", "share", "share.php", "plugins", "dialog", "tr", "login",
    "login.php", "profile.php", "pages", "groups", "events", "watch", "help", "policies",
    "privacy",
];

/// What one page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedPage {
    pub signals: ContactSignals,
    /// Same-site page that looks like a contact page, if any.
    pub contact_page: Option<Url>,
}

/// Scan a page for contact signals and a contact-page link.
pub fn scan_page(html: &str, base_url: &Url) -> ScannedPage {
    let doc = Html::parse_document(html);
    let hrefs: Vec<(String, String)> = doc
        .select(&ANCHOR_SEL)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim().to_string();
            let text = el.text().collect::<String>();
            Some((href, text))
        })
        .collect();

    let email = hrefs
        .iter()
        .find_map(|(href, _)| mailto_address(href))
        .or_else(|| find_email(html));

    let resolved: Vec<String> = hrefs
        .iter()
        .filter(|(href, _)| !href.starts_with("mailto:") && !href.starts_with('#'))
        .filter_map(|(href, _)| base_url.join(href).ok())
        .map(|url| url.to_string())
        .collect();

    let signals = ContactSignals {
        email,
        instagram: first_social(&resolved, html, find_instagram),
        facebook: first_social(&resolved, html, find_facebook),
        linkedin: first_social(&resolved, html, find_linkedin),
    };

    ScannedPage {
        signals,
        contact_page: find_contact_page(&hrefs, base_url),
    }
}

fn first_social(links: &[String], body: &str, find: fn(&str) -> Option<String>) -> Option<String> {
    links.iter().find_map(|link| find(link)).or_else(|| find(body))
}

fn mailto_address(href: &str) -> Option<String> {
    let rest = href.strip_prefix("mailto:").or_else(|| href.strip_prefix("MAILTO:"))?;
    let address = rest.split('?').next().unwrap_or_default().trim();
    let address = address.replace("%40", "@");
    EMAIL_RE
        .find(&address)
        .filter(|m| m.start() == 0 && m.end() == address.len())
        .map(|m| m.as_str().to_string())
        .filter(|email| is_plausible_email(email))
}

/// First plausible email address in `text`.
pub fn find_email(text: &str) -> Option<String> {
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|email| is_plausible_email(email))
        .map(str::to_string)
}

fn is_plausible_email(email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();
    let tld = domain.rsplit('.').next().unwrap_or_default();
    if ASSET_SUFFIXES.contains(&tld) {
        return false;
    }
    !IGNORED_EMAIL_DOMAINS
        .iter()
        .any(|ignored| domain == *ignored || domain.ends_with(&format!(".{ignored}")))
}

/// First Instagram profile in `text`, as `https://instagram.com/{handle}`.
pub fn find_instagram(text: &str) -> Option<String> {
    INSTAGRAM_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .find(|handle| is_profile_handle(handle, INSTAGRAM_RESERVED))
        .map(|handle| format!("https://instagram.com/{handle}"))
}

/// First Facebook page in `text`, as `https://facebook.com/{handle}`.
pub fn find_facebook(text: &str) -> Option<String> {
    FACEBOOK_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .find(|handle| is_profile_handle(handle, FACEBOOK_RESERVED))
        .map(|handle| format!("https://facebook.com/{handle}"))
}

/// First LinkedIn company or person page, keeping its kind.
pub fn find_linkedin(text: &str) -> Option<String> {
    LINKEDIN_RE.captures_iter(text).find_map(|caps| {
        let kind = caps.get(1)?.as_str().to_ascii_lowercase();
        let handle = caps.get(2)?.as_str().trim_end_matches('.');
        (!handle.is_empty()).then(|| format!("https://linkedin.com/{kind}/{handle}"))
    })
}

fn is_profile_handle(handle: &str, reserved: &[&str]) -> bool {
    let lower = handle.to_ascii_lowercase();
    !lower.is_empty() && !lower.chars().all(|c| c == '.') && !reserved.contains(&lower.as_str())
}

fn same_site(a: &Url, b: &Url) -> bool {
    let strip = |url: &Url| {
        url.host_str()
            .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    };
    strip(a).is_some() && strip(a) == strip(b) && a.port_or_known_default() == b.port_or_known_default()
}

fn find_contact_page(hrefs: &[(String, String)], base_url: &Url) -> Option<Url> {
    hrefs.iter().find_map(|(href, text)| {
        let mentions_contact = href.to_ascii_lowercase().contains("contact")
            || text.to_ascii_lowercase().contains("contact");
        if !mentions_contact || href.starts_with("mailto:") {
            return None;
        }
        let mut url = base_url.join(href).ok()?;
        url.set_fragment(None);
        let is_http = matches!(url.scheme(), "http" | "https");
        (is_http && same_site(&url, base_url) && url.path() != base_url.path()).then_some(url)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("{}/../../../fixtures/html/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn base() -> Url {
        Url::parse("https://hartleyplumbing.co.uk/").unwrap()
    }

    #[test]
    fn scans_homepage_fixture() {
        let page = scan_page(&load_fixture("plumber_home.html"), &base());
        assert_eq!(
            page.signals.email.as_deref(),
            Some("office@hartleyplumbing.co.uk")
        );
        assert_eq!(
            page.signals.facebook.as_deref(),
            Some("https://facebook.com/HartleyPlumbingMCR")
        );
        assert_eq!(
            page.signals.instagram.as_deref(),
            Some("https://instagram.com/hartley.plumbing")
        );
        assert_eq!(
            page.signals.linkedin.as_deref(),
            Some("https://linkedin.com/company/hartley-plumbing-heating")
        );
        assert_eq!(
            page.contact_page.map(|u| u.to_string()).as_deref(),
            Some("https://hartleyplumbing.co.uk/contact-us")
        );
    }

    #[test]
    fn scans_plain_text_when_no_anchors() {
        let base = Url::parse("https://pipelineplumbers.com/contact").unwrap();
        let page = scan_page(&load_fixture("plumber_contact.html"), &base);
        assert_eq!(
            page.signals.email.as_deref(),
            Some("enquiries@pipelineplumbers.com")
        );
        assert_eq!(
            page.signals.instagram.as_deref(),
            Some("https://instagram.com/pipeline_plumbers")
        );
        assert!(page.signals.facebook.is_none());
        assert!(page.signals.linkedin.is_none());
    }

    #[test]
    fn asset_names_are_not_emails() {
        assert_eq!(find_email("<img src=\"logo@2x.png\">"), None);
        assert_eq!(
            find_email("icon@3x.webp then hello@acme.co.uk"),
            Some("hello@acme.co.uk".to_string())
        );
        assert_eq!(find_email("user@example.com"), None);
    }

    #[test]
    fn mailto_strips_query() {
        assert_eq!(
            mailto_address("mailto:jo@acme.com?subject=Hi").as_deref(),
            Some("jo@acme.com")
        );
        assert_eq!(mailto_address("mailto:not-an-email"), None);
        assert_eq!(mailto_address("https://acme.com"), None);
    }

    #[test]
    fn share_and_plugin_links_are_ignored() {
        let text = "https://www.facebook.com/sharer/sharer.php?u=x \
                    https://facebook.com/plugins/page.php \
                    https://www.instagram.com/p/Cabc123/";
        assert_eq!(find_facebook(text), None);
        assert_eq!(find_instagram(text), None);
    }

    #[test]
    fn linkedin_keeps_person_kind() {
        assert_eq!(
            find_linkedin("see https://www.linkedin.com/in/jane-doe-123/").as_deref(),
            Some("https://linkedin.com/in/jane-doe-123")
        );
    }

    #[test]
    fn contact_page_must_be_same_site() {
        let hrefs = vec![
            (
                "https://directory.example.org/contact".to_string(),
                "Contact".to_string(),
            ),
            ("/get-in-touch".to_string(), "Contact us".to_string()),
        ];
        let found = find_contact_page(&hrefs, &base()).unwrap();
        assert_eq!(found.as_str(), "https://hartleyplumbing.co.uk/get-in-touch");
    }
}
