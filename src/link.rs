//! Invitation link extraction.
//!
//! Three tiers are tried in order and the first hit wins:
//!
//! 1. a URL in the plain-text body containing the application domain and
//!    the token marker;
//! 2. an `href` attribute in the HTML body with the same markers, entity
//!    decoded (`&#x3D;` and `&#x26;` otherwise corrupt the query string);
//! 3. a URL in either body containing the domain and an invite path
//!    segment, token marker not required.
//!
//! ```
//! use inbox_otp::link::LinkExtractor;
//! use inbox_otp::parser::NormalizedBody;
//!
//! let body = NormalizedBody::from_parts(
//!     "",
//!     r#"<a href="https://app.example.com/auth/register/otp?token&#x3D;abc123">Join</a>"#,
//! );
//! let link = LinkExtractor::new("app.example.com").extract(&body);
//! assert_eq!(
//!     link.as_deref(),
//!     Some("https://app.example.com/auth/register/otp?token=abc123")
//! );
//! ```

use crate::config::ExtractionConfig;
use crate::html;
use crate::parser::NormalizedBody;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid regex"));

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// Characters that end up glued to a URL in prose or markup.
const TRAILING: &[char] = &[']', ')', '>', '.', ',', ';', '"', '\'', '*'];

const PREVIEW_CHARS: usize = 200;

/// Finds invitation URLs for one application domain.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    domain: String,
    token_marker: String,
    invite_paths: Vec<String>,
}

impl LinkExtractor {
    /// Creates an extractor for `domain` with the default token marker and invite paths.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            domain: domain.into().to_lowercase(),
            token_marker: defaults.token_marker.to_lowercase(),
            invite_paths: defaults.invite_paths,
        }
    }

    /// Creates an extractor from configuration; `None` if no application domain is set.
    #[must_use]
    pub fn from_config(config: &ExtractionConfig) -> Option<Self> {
        let domain = config.app_domain.as_ref()?;
        Some(
            Self::new(domain.as_str())
                .with_token_marker(config.token_marker.as_str())
                .with_invite_paths(config.invite_paths.iter().cloned()),
        )
    }

    /// Sets the marker that identifies a tokenized link.
    #[must_use]
    pub fn with_token_marker(mut self, marker: impl Into<String>) -> Self {
        self.token_marker = marker.into().to_lowercase();
        self
    }

    /// Sets the path segments accepted by the fallback tier.
    #[must_use]
    pub fn with_invite_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invite_paths = paths
            .into_iter()
            .map(|p| p.into().trim_matches('/').to_lowercase())
            .collect();
        self
    }

    /// The application domain links must contain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Extracts the invitation link from a message.
    #[must_use]
    pub fn extract(&self, body: &NormalizedBody) -> Option<String> {
        let text_urls = urls_in(&body.plain_text);
        if let Some(url) = text_urls.iter().find(|url| self.is_token_link(url)) {
            debug!(tier = 1, "Found invitation link in text body");
            return Some(url.clone());
        }

        let hrefs = hrefs_in(&body.html);
        if let Some(url) = hrefs.iter().find(|url| self.is_token_link(url)) {
            debug!(tier = 2, "Found invitation link in HTML href");
            return Some(url.clone());
        }

        let decoded_html = html::decode_entities(&body.html);
        let html_urls = urls_in(&decoded_html);
        if let Some(url) = text_urls
            .iter()
            .chain(&hrefs)
            .chain(&html_urls)
            .find(|url| self.is_invite_link(url))
        {
            debug!(tier = 3, "Found invitation link by path");
            return Some(url.clone());
        }

        let source = if body.plain_text.trim().is_empty() {
            body.html.as_str()
        } else {
            body.plain_text.as_str()
        };
        debug!(
            domain = %self.domain,
            preview = %html::preview(source, PREVIEW_CHARS),
            "No invitation link found"
        );
        None
    }

    fn has_domain(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.domain)
    }

    fn is_token_link(&self, url: &str) -> bool {
        self.has_domain(url) && url.to_lowercase().contains(&self.token_marker)
    }

    fn is_invite_link(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.has_domain(url)
            && self
                .invite_paths
                .iter()
                .any(|path| lower.contains(&format!("/{path}")))
    }
}

fn trim_url(url: &str) -> &str {
    url.trim_end_matches(TRAILING)
}

fn urls_in(text: &str) -> Vec<String> {
    URL.find_iter(text)
        .map(|m| trim_url(m.as_str()).to_string())
        .collect()
}

fn hrefs_in(html_body: &str) -> Vec<String> {
    HREF.captures_iter(html_body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| html::decode_entities(m.as_str().trim()).into_owned())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .map(|url| trim_url(&url).to_string())
        .collect()
}
