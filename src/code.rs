//! One-time code extraction.
//!
//! Codes are found by an explicit rule table. Each [`CodeRule`] carries a
//! priority; rules are tried in ascending priority and the first rule that
//! matches wins, even if a later rule would match earlier in the text.
//! The default table tries phrase-anchored patterns before bare digit runs
//! and 6-digit forms before 4-digit forms:
//!
//! | priority | rule                  | example                              |
//! |----------|-----------------------|--------------------------------------|
//! | 10       | `verification-code-6` | `Your verification code is: 123456`  |
//! | 20       | `otp-6`               | `Here's your OTP ...:\n\n117734`     |
//! | 30       | `code-6`              | `Code: 123456`                       |
//! | 40       | `line-6`              | a line holding only `123456`         |
//! | 50       | `bare-6`              | any standalone 6-digit run           |
//! | 60       | `keyword-4`           | `PIN 4711`                           |
//! | 70       | `line-4`              | a line holding only `4711`           |
//!
//! ```
//! use inbox_otp::code::CodeExtractor;
//!
//! let extractor = CodeExtractor::default();
//! assert_eq!(
//!     extractor.extract_from_text("Your OTP: 482913. Order #1234 confirmed."),
//!     Some("482913".to_string())
//! );
//! ```

use crate::matcher::{Matcher, RegexMatcher};
use crate::parser::NormalizedBody;
use tracing::debug;

/// One entry of the code rule table.
pub struct CodeRule {
    name: String,
    priority: u16,
    matcher: Box<dyn Matcher>,
}

impl CodeRule {
    /// Creates a rule from any [`Matcher`].
    #[must_use]
    pub fn new(name: impl Into<String>, priority: u16, matcher: impl Matcher + 'static) -> Self {
        Self {
            name: name.into(),
            priority,
            matcher: Box::new(matcher),
        }
    }

    /// Creates a rule from a regex whose first capture group is the code.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn regex(
        name: impl Into<String>,
        priority: u16,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        let name = name.into();
        let matcher = RegexMatcher::with_description(pattern, name.clone())?;
        Ok(Self::new(name, priority, matcher))
    }

    /// Rule name, as logged when it matches.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower priorities are tried first.
    #[must_use]
    pub fn priority(&self) -> u16 {
        self.priority
    }
}

impl std::fmt::Debug for CodeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("matcher", &self.matcher.description())
            .finish()
    }
}

const DEFAULT_RULES: [(&str, u16, &str); 7] = [
    (
        "verification-code-6",
        10,
        r"(?i)\bverification\s+code\b[^0-9]{0,40}?\b(\d{6})\b",
    ),
    (
        "otp-6",
        20,
        r"(?i)\b(?:otp|one[-\s]time\s+(?:password|passcode|code))\b[^0-9]{0,80}?\b(\d{6})\b",
    ),
    (
        "code-6",
        30,
        r"(?i)\b(?:code|passcode)\b[^0-9]{0,40}?\b(\d{6})\b",
    ),
    ("line-6", 40, r"(?m)^[ \t]*(\d{6})[ \t]*\r?$"),
    ("bare-6", 50, r"\b(\d{6})\b"),
    (
        "keyword-4",
        60,
        r"(?i)\b(?:otp|code|pin)\b[^0-9]{0,40}?\b(\d{4})\b",
    ),
    ("line-4", 70, r"(?m)^[ \t]*(\d{4})[ \t]*\r?$"),
];

/// Ordered rule table for one-time codes.
#[derive(Debug)]
pub struct CodeExtractor {
    rules: Vec<CodeRule>,
}

impl Default for CodeExtractor {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(name, priority, pattern)| {
                CodeRule::regex(*name, *priority, pattern).expect("valid regex")
            })
            .collect();
        Self::with_rules(rules)
    }
}

impl CodeExtractor {
    /// Creates an extractor from a custom table, ordered by priority.
    ///
    /// Rules with equal priority keep their given order.
    #[must_use]
    pub fn with_rules(mut rules: Vec<CodeRule>) -> Self {
        rules.sort_by_key(CodeRule::priority);
        Self { rules }
    }

    /// The rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[CodeRule] {
        &self.rules
    }

    /// Extracts a code from a message.
    ///
    /// Each rule is tried against the plain text and then the text rendered
    /// from the HTML part before moving on to the next rule.
    #[must_use]
    pub fn extract(&self, body: &NormalizedBody) -> Option<String> {
        let views = body.text_views();
        self.rules.iter().find_map(|rule| {
            views.iter().find_map(|view| {
                rule.matcher.find_match(view).map(|code| {
                    debug!(rule = %rule.name, code_len = code.len(), "Code rule matched");
                    code.into_owned()
                })
            })
        })
    }

    /// Extracts a code from a single text.
    #[must_use]
    pub fn extract_from_text(&self, text: &str) -> Option<String> {
        self.extract(&NormalizedBody::from_parts(text, ""))
    }
}
