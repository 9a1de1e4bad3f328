//! Parsing raw messages into the views the extractors work on.
//!
//! [`normalize`] never fails: a message that cannot be decoded becomes an
//! empty [`NormalizedBody`], which simply matches nothing.

use crate::error::{Error, Result};
use crate::html;
use mailparse::{DispositionType, MailHeader, MailHeaderMap, ParsedMail};
use std::borrow::Cow;
use tracing::warn;

/// Headers that name the recipient a message was delivered for.
const RECIPIENT_HEADERS: [&str; 4] = ["To", "Cc", "Delivered-To", "X-Original-To"];

/// Decoded text and HTML views of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBody {
    /// Decoded `Subject` header.
    pub subject: Option<String>,
    /// Decoded `From` header.
    pub from: Option<String>,
    /// Plain text, entity-decoded. Rendered from the HTML part when the
    /// message has no usable `text/plain` part.
    pub plain_text: String,
    /// HTML part with transfer encoding removed; entities are left in place.
    pub html: String,
    plain_from_html: bool,
}

impl NormalizedBody {
    /// Builds a body from already-decoded parts.
    #[must_use]
    pub fn from_parts(plain_text: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            plain_text: plain_text.into(),
            html: html.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if neither view has any content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plain_text.trim().is_empty() && self.html.trim().is_empty()
    }

    /// Text views in search order: the plain text, then text rendered from
    /// the HTML part unless the plain text already came from it.
    #[must_use]
    pub fn text_views(&self) -> Vec<Cow<'_, str>> {
        let mut views = Vec::with_capacity(2);
        if !self.plain_text.trim().is_empty() {
            views.push(Cow::Borrowed(self.plain_text.as_str()));
        }
        if !self.plain_from_html && !self.html.trim().is_empty() {
            views.push(Cow::Owned(html::to_text(&self.html)));
        }
        views
    }
}

/// Header-level facts used to decide whether a message is a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Every recipient address found in the recipient headers, in header order.
    pub recipients: Vec<String>,
    /// Decoded `Subject` header.
    pub subject: Option<String>,
}

/// Reads recipients and subject from the header block of a raw message.
///
/// Lenient: unparseable headers produce an empty envelope.
#[must_use]
pub fn parse_envelope(raw: &[u8]) -> Envelope {
    let Ok((headers, _)) = mailparse::parse_headers(raw) else {
        return Envelope::default();
    };

    let mut recipients: Vec<String> = Vec::new();
    for name in RECIPIENT_HEADERS {
        for header in headers.get_all_headers(name) {
            for address in header_addresses(header) {
                if !recipients.iter().any(|r| r.eq_ignore_ascii_case(&address)) {
                    recipients.push(address);
                }
            }
        }
    }

    Envelope {
        recipients,
        subject: headers.get_first_value("Subject"),
    }
}

fn header_addresses(header: &MailHeader<'_>) -> Vec<String> {
    match mailparse::addrparse_header(header) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                mailparse::MailAddr::Single(info) => vec![info.addr.clone()],
                mailparse::MailAddr::Group(group) => {
                    group.addrs.iter().map(|info| info.addr.clone()).collect()
                }
            })
            .collect(),
        // Delivered-To and friends are sometimes bare, unbracketed addresses
        Err(_) => {
            let value = header.get_value();
            let value = value.trim().trim_matches(|c| c == '<' || c == '>');
            if value.contains('@') {
                vec![value.to_string()]
            } else {
                Vec::new()
            }
        }
    }
}

/// Produces the normalized views of a raw message, or an empty body if it
/// cannot be decoded.
#[must_use]
pub fn normalize(raw: &[u8]) -> NormalizedBody {
    match try_normalize(raw) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to decode email, treating body as empty");
            NormalizedBody::default()
        }
    }
}

/// Fallible form of [`normalize`].
///
/// # Errors
///
/// Returns [`Error::ParseEmail`] if the MIME structure cannot be parsed and
/// [`Error::ExtractBody`] if a text part cannot be decoded.
pub fn try_normalize(raw: &[u8]) -> Result<NormalizedBody> {
    let parsed = mailparse::parse_mail(raw).map_err(|source| Error::ParseEmail { source })?;

    let mut text = None;
    let mut html_part = None;
    walk_parts(&parsed, &mut text, &mut html_part)?;

    let html_part = html_part.unwrap_or_default();
    let (plain_text, plain_from_html) = match text {
        Some(text) if !text.trim().is_empty() => (html::decode_entities(&text).into_owned(), false),
        _ if !html_part.trim().is_empty() => (html::to_text(&html_part), true),
        _ => (String::new(), false),
    };

    Ok(NormalizedBody {
        subject: parsed.headers.get_first_value("Subject"),
        from: parsed.headers.get_first_value("From"),
        plain_text,
        html: html_part,
        plain_from_html,
    })
}

/// Walks the MIME tree keeping the first inline `text/plain` and `text/html` parts.
fn walk_parts(
    part: &ParsedMail<'_>,
    text: &mut Option<String>,
    html_part: &mut Option<String>,
) -> Result<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk_parts(sub, text, html_part)?;
        }
        return Ok(());
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return Ok(());
    }

    let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" => text,
        "text/html" => html_part,
        _ => return Ok(()),
    };

    if slot.is_none() {
        *slot = Some(
            part.get_body()
                .map_err(|source| Error::ExtractBody { source })?,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"From: App <noreply@app.example.com>\r\n\
To: qa+42@example.com\r\n\
Subject: Welcome to Acme on App\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Here's your OTP to complete the registration:\r\n\
\r\n\
117734\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<a href=3D\"https://app.example.com/auth/register/otp?token&#x3D;XYZ\">Join</a>\r\n\
--b1--\r\n";

    #[test]
    fn test_normalize_multipart() {
        let body = normalize(MULTIPART);
        assert_eq!(body.subject.as_deref(), Some("Welcome to Acme on App"));
        assert!(body.plain_text.contains("117734"));
        // quoted-printable removed, entities kept for the link extractor
        assert!(body
            .html
            .contains(r#"href="https://app.example.com/auth/register/otp?token&#x3D;XYZ""#));
        assert_eq!(body.text_views().len(), 2);
    }

    #[test]
    fn test_normalize_simple() {
        let raw = b"From: test@example.com\r\nTo: user@example.com\r\n\r\nYour code is 123456.";
        let body = normalize(raw);
        assert!(body.plain_text.contains("123456"));
        assert!(body.html.is_empty());
    }

    #[test]
    fn test_html_only_message_gets_plain_text() {
        let raw = b"To: user@example.com\r\nContent-Type: text/html\r\n\r\n<p>Code: <b>424242</b> &amp; more</p>";
        let body = normalize(raw);
        assert!(body.plain_text.contains("424242"));
        assert!(body.plain_text.contains('&'));
        // plain text already derived from the HTML, no second view
        assert_eq!(body.text_views().len(), 1);
    }

    #[test]
    fn test_plain_text_entities_decoded() {
        let raw = b"To: user@example.com\r\n\r\nGo to https://app.example.com/x?token&#x3D;1&amp;a=2";
        let body = normalize(raw);
        assert!(body.plain_text.contains("token=1&a=2"));
    }

    #[test]
    fn test_corrupt_body_yields_empty() {
        let raw = b"To: user@example.com\r\nContent-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\n@@@@ not base64 @@@@";
        assert!(try_normalize(raw).is_err());
        assert!(normalize(raw).is_empty());
    }

    #[test]
    fn test_attachments_are_skipped() {
        let raw = b"To: user@example.com\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"codes.txt\"\r\n\
\r\n\
999999\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
Your code is 111222\r\n\
--b--\r\n";
        let body = normalize(raw);
        assert!(body.plain_text.contains("111222"));
        assert!(!body.plain_text.contains("999999"));
    }

    #[test]
    fn test_parse_envelope_collects_recipients() {
        let raw = b"To: \"QA\" <qa+a@example.com>, other@example.com\r\n\
Delivered-To: qa+a@example.com\r\n\
Subject: You're invited\r\n\r\nbody";
        let envelope = parse_envelope(raw);
        assert_eq!(
            envelope.recipients,
            vec!["qa+a@example.com".to_string(), "other@example.com".to_string()]
        );
        assert_eq!(envelope.subject.as_deref(), Some("You're invited"));
    }

    #[test]
    fn test_parse_envelope_without_headers() {
        let envelope = parse_envelope(b"");
        assert!(envelope.recipients.is_empty());
        assert!(envelope.subject.is_none());
    }
}
