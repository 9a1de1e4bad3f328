//! Address tagging helpers.
//!
//! Mail providers deliver `local+tag@domain` to the `local@domain` mailbox,
//! so one inbox can serve many test identities. The retriever tells them
//! apart by the full recipient address.
//!
//! ```
//! use inbox_otp::alias;
//!
//! let address = alias::tag_address("qa@gmail.com", "signup42").unwrap();
//! assert_eq!(address, "qa+signup42@gmail.com");
//! assert_eq!(alias::base_address(&address), "qa@gmail.com");
//! ```

use crate::config::validate_email;
use crate::error::{Error, Result};
use chrono::Utc;

const TAG_SEPARATOR: char = '+';

/// Builds `local+tag@domain` from `base`, replacing any tag already present.
///
/// # Errors
///
/// Returns [`Error::InvalidEmailFormat`] if `base` is not a valid address
/// and [`Error::InvalidConfig`] if `tag` is empty or contains characters
/// other than ASCII alphanumerics, `-`, `_` and `.`.
pub fn tag_address(base: &str, tag: &str) -> Result<String> {
    validate_email(base)?;

    if tag.is_empty()
        || !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidConfig {
            message: format!("invalid address tag: {tag:?}"),
        });
    }

    let (local, domain) = split(base).ok_or_else(|| Error::InvalidEmailFormat {
        email: base.to_string(),
    })?;
    let tagged = format!("{}{TAG_SEPARATOR}{tag}@{domain}", untagged(local));

    validate_email(&tagged)?;
    Ok(tagged)
}

/// Tags `base` with the current UTC time in milliseconds.
///
/// # Errors
///
/// Returns [`Error::InvalidEmailFormat`] if `base` is not a valid address.
pub fn unique_tag_address(base: &str) -> Result<String> {
    tag_address(base, &Utc::now().timestamp_millis().to_string())
}

/// Strips the tag from an address. Input without a tag is returned as is.
#[must_use]
pub fn base_address(address: &str) -> String {
    match split(address) {
        Some((local, domain)) => format!("{}@{domain}", untagged(local)),
        None => address.to_string(),
    }
}

/// Returns the tag of an address, if it has one.
#[must_use]
pub fn tag_of(address: &str) -> Option<&str> {
    let (local, _) = split(address)?;
    local
        .split_once(TAG_SEPARATOR)
        .map(|(_, tag)| tag)
        .filter(|tag| !tag.is_empty())
}

fn split(address: &str) -> Option<(&str, &str)> {
    address.rsplit_once('@')
}

fn untagged(local: &str) -> &str {
    local
        .split_once(TAG_SEPARATOR)
        .map_or(local, |(head, _)| head)
}
