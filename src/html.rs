//! HTML helpers for email bodies: entity decoding, tag stripping and
//! bounded previews for diagnostics.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("valid regex")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static STYLE_OR_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(style|script)\b.*?</(style|script)\s*>").expect("valid regex")
});

/// Wrap width handed to `html2text`; wide enough that codes and URLs stay on one line.
const TEXT_WIDTH: usize = 1_000;

/// Decodes HTML character references.
///
/// Handles the common named entities plus decimal (`&#61;`) and hex
/// (`&#x3D;`) references. Unknown or invalid references are left untouched.
///
/// ```
/// use inbox_otp::html::decode_entities;
///
/// assert_eq!(
///     decode_entities("otp?token&#x3D;abc&#x26;next&#61;1"),
///     "otp?token=abc&next=1"
/// );
/// ```
#[must_use]
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    ENTITY.replace_all(input, |caps: &Captures<'_>| {
        let reference = &caps[1];
        decode_reference(reference).map_or_else(|| caps[0].to_string(), String::from)
    })
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(hex) = reference
        .strip_prefix("#x")
        .or_else(|| reference.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = reference.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }

    match reference {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

/// Converts an HTML body to plain text.
///
/// Uses `html2text` for rendering; if that fails the markup is stripped with
/// a regex and entities are decoded.
#[must_use]
pub fn to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), TEXT_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "html2text failed, stripping tags");
            strip_tags(html)
        }
    }
}

/// Removes tags (and `style`/`script` contents) and decodes entities.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let without_blocks = STYLE_OR_SCRIPT.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, " ");
    decode_entities(&without_tags).into_owned()
}

/// Returns at most `max_chars` characters of `text` with whitespace collapsed.
///
/// Used to log what a message looked like when nothing could be extracted.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars).collect();
    out.push('…');
    out
}
