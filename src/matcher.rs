//! Text matching primitives the extractors are built from.
//!
//! ```
//! use inbox_otp::matcher::{Matcher, RegexMatcher};
//!
//! let matcher = RegexMatcher::new(r"(?i)pin:\s*(\d{4})").unwrap();
//! assert_eq!(matcher.find_match("PIN: 4711").as_deref(), Some("4711"));
//! ```

use regex::Regex;
use std::borrow::Cow;

/// Trait for finding and extracting a value from text.
///
/// Implement this to plug custom rules into a
/// [`CodeExtractor`](crate::code::CodeExtractor).
pub trait Matcher: Send + Sync {
    /// Returns the extracted value, borrowing from `text` where possible.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Human-readable description, used in logs.
    fn description(&self) -> &str;
}

/// Regex-based matcher that extracts the first capture group.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a new regex matcher.
    ///
    /// The first capture group is the extracted value; a pattern without
    /// groups never matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    /// Creates a new regex matcher with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
        })
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}
