//! Poll-and-wait retrieval of one-time codes and invitation links.
//!
//! The [`InboxRetriever`] is the main entry point for this crate. Each call
//! opens its own mailbox session, polls for unread mail addressed to one
//! recipient until a message yields what was asked for or the deadline
//! passes, marks the winning message read and closes the session on every
//! exit path.
//!
//! # Example
//!
//! ```no_run
//! use inbox_otp::{ImapConfig, InboxRetriever};
//! use std::time::Duration;
//!
//! # async fn example() -> inbox_otp::Result<()> {
//! let config = ImapConfig::builder()
//!     .email("qa@gmail.com")
//!     .password("app-password")
//!     .app_domain("app.example.com")
//!     .build()?;
//!
//! let retriever = InboxRetriever::imap(config);
//! let code = retriever
//!     .get_one_time_code("qa+login7@gmail.com", Duration::from_secs(60))
//!     .await?;
//! println!("Got OTP: {code}");
//! # Ok(())
//! # }
//! ```

use crate::code::CodeExtractor;
use crate::config::{self, ExtractionConfig, ImapConfig, PollingConfig};
use crate::error::{Error, Result};
use crate::html;
use crate::imap::ImapConnector;
use crate::link::LinkExtractor;
use crate::parser;
use crate::transport::{CandidateFilter, CandidateMessage, MailboxConnector, MailboxSession};
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

const PREVIEW_CHARS: usize = 200;

/// Deadline used when `started + max_wait` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Floor for the poll interval so a zero interval cannot spin on the mailbox.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a retrieval call waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A one-time code.
    Code,
    /// An invitation link.
    Link,
    /// A link and a code in the same message.
    Both,
}

impl Selection {
    fn wants_code(self) -> bool {
        matches!(self, Selection::Code | Selection::Both)
    }

    fn wants_link(self) -> bool {
        matches!(self, Selection::Link | Selection::Both)
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selection::Code => write!(f, "code"),
            Selection::Link => write!(f, "link"),
            Selection::Both => write!(f, "link+code"),
        }
    }
}

/// What was found in one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// The one-time code, if any.
    pub code: Option<String>,
    /// The invitation link, if any.
    pub link: Option<String>,
}

impl ExtractionResult {
    /// Returns `true` if this result has everything `selection` asks for.
    #[must_use]
    pub fn satisfies(&self, selection: Selection) -> bool {
        (!selection.wants_code() || self.code.is_some())
            && (!selection.wants_link() || self.link.is_some())
    }
}

/// Invitation link and code delivered in one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteData {
    /// The invitation URL.
    pub link: String,
    /// The one-time code.
    pub code: String,
}

/// Bookkeeping for one retrieval call.
#[derive(Debug)]
struct PollState {
    started: Instant,
    deadline: Instant,
    polls: u32,
    interval: Duration,
}

impl PollState {
    fn new(started: Instant, max_wait: Duration, interval: Duration) -> Self {
        Self {
            started,
            deadline: started
                .checked_add(max_wait)
                .unwrap_or_else(|| started + FAR_FUTURE),
            polls: 0,
            interval,
        }
    }

    /// Sleep until the next poll, never past the deadline.
    fn next_sleep(&self, now: Instant) -> Duration {
        self.interval
            .min(self.deadline.saturating_duration_since(now))
    }
}

/// Polls a mailbox for codes and invitation links.
///
/// Generic over the mailbox so tests can run against
/// [`InMemoryMailbox`](crate::memory::InMemoryMailbox). Methods take `&self`
/// and each call owns its session, so one retriever can serve concurrent
/// calls for different recipients.
pub struct InboxRetriever<C> {
    connector: C,
    polling: PollingConfig,
    code: CodeExtractor,
    link: Option<LinkExtractor>,
    invite_subjects: Vec<String>,
    code_subjects: Vec<String>,
}

impl InboxRetriever<ImapConnector> {
    /// Creates a retriever over IMAP using the polling and extraction settings in `config`.
    #[must_use]
    pub fn imap(config: ImapConfig) -> Self {
        let polling = config.polling.clone();
        let extraction = config.extraction.clone();
        Self::new(ImapConnector::new(config), polling, &extraction)
    }
}

impl<C: MailboxConnector> InboxRetriever<C> {
    /// Creates a retriever over any mailbox.
    ///
    /// Poll intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(connector: C, mut polling: PollingConfig, extraction: &ExtractionConfig) -> Self {
        if polling.interval < MIN_POLL_INTERVAL {
            warn!(
                interval_ms = polling.interval.as_millis(),
                min_ms = MIN_POLL_INTERVAL.as_millis(),
                "Poll interval too small, using minimum"
            );
            polling.interval = MIN_POLL_INTERVAL;
        }

        Self {
            connector,
            polling,
            code: CodeExtractor::default(),
            link: LinkExtractor::from_config(extraction),
            invite_subjects: extraction.invite_subjects.clone(),
            code_subjects: extraction.code_subjects.clone(),
        }
    }

    /// Replaces the code rule table.
    #[must_use]
    pub fn with_code_extractor(mut self, code: CodeExtractor) -> Self {
        self.code = code;
        self
    }

    /// Replaces the link extractor.
    #[must_use]
    pub fn with_link_extractor(mut self, link: LinkExtractor) -> Self {
        self.link = Some(link);
        self
    }

    /// The underlying connector.
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Waits for a one-time code sent to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WaitTimeout`] if no code arrives within `max_wait`,
    /// a connection error if the mailbox fails, and
    /// [`Error::InvalidEmailFormat`] for a malformed address.
    #[instrument(name = "InboxRetriever::get_one_time_code", skip(self))]
    pub async fn get_one_time_code(&self, address: &str, max_wait: Duration) -> Result<String> {
        self.poll_until(address, Selection::Code, max_wait, |result| result.code)
            .await
    }

    /// Waits for an invitation link sent to `address`.
    ///
    /// # Errors
    ///
    /// As [`get_one_time_code`](Self::get_one_time_code), plus
    /// [`Error::InvalidConfig`] if no application domain is configured.
    #[instrument(name = "InboxRetriever::get_invite_link", skip(self))]
    pub async fn get_invite_link(&self, address: &str, max_wait: Duration) -> Result<String> {
        self.poll_until(address, Selection::Link, max_wait, |result| result.link)
            .await
    }

    /// Waits for one message carrying both an invitation link and a code.
    ///
    /// # Errors
    ///
    /// As [`get_invite_link`](Self::get_invite_link).
    #[instrument(name = "InboxRetriever::get_invite_data", skip(self))]
    pub async fn get_invite_data(&self, address: &str, max_wait: Duration) -> Result<InviteData> {
        self.poll_until(address, Selection::Both, max_wait, |result| {
            Some(InviteData {
                link: result.link?,
                code: result.code?,
            })
        })
        .await
    }

    /// General form: waits for a message satisfying `selection`.
    ///
    /// # Errors
    ///
    /// As [`get_invite_link`](Self::get_invite_link).
    #[instrument(name = "InboxRetriever::wait_for", skip(self, selection), fields(selection = %selection))]
    pub async fn wait_for(
        &self,
        address: &str,
        selection: Selection,
        max_wait: Duration,
    ) -> Result<ExtractionResult> {
        self.poll_until(address, selection, max_wait, |result| {
            result.satisfies(selection).then_some(result)
        })
        .await
    }

    /// Opens a session, polls, and closes the session whatever the outcome.
    async fn poll_until<T, F>(
        &self,
        address: &str,
        selection: Selection,
        max_wait: Duration,
        pick: F,
    ) -> Result<T>
    where
        F: Fn(ExtractionResult) -> Option<T> + Send + Sync,
        T: Send,
    {
        let started = Instant::now();
        config::validate_email(address)?;

        let link = if selection.wants_link() {
            Some(self.link.as_ref().ok_or_else(|| Error::InvalidConfig {
                message: "an application domain is required to extract invitation links".into(),
            })?)
        } else {
            None
        };

        let filter = CandidateFilter::unread_for(address).since(self.since_date());
        let mut session = self.connector.open().await?;

        let mut state = PollState::new(started, max_wait, self.polling.interval);
        let outcome = self
            .poll(&mut session, &filter, selection, link, &mut state, &pick)
            .await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close mailbox session");
        }

        match &outcome {
            Ok(_) => debug!(
                polls = state.polls,
                elapsed_ms = state.started.elapsed().as_millis(),
                "Retrieval succeeded"
            ),
            Err(e) => debug!(polls = state.polls, error = %e, "Retrieval failed"),
        }
        outcome
    }

    async fn poll<T, F>(
        &self,
        session: &mut C::Session,
        filter: &CandidateFilter,
        selection: Selection,
        link: Option<&LinkExtractor>,
        state: &mut PollState,
        pick: &F,
    ) -> Result<T>
    where
        F: Fn(ExtractionResult) -> Option<T> + Send + Sync,
        T: Send,
    {
        let subjects = if selection.wants_link() {
            &self.invite_subjects
        } else {
            &self.code_subjects
        };

        loop {
            state.polls += 1;
            let candidates = session.fetch_candidates(filter).await?;

            debug!(
                poll = state.polls,
                candidates = candidates.len(),
                "Inspecting candidates"
            );

            // Newest first
            for candidate in candidates.iter().rev() {
                if !candidate.subject_matches(subjects) {
                    debug!(uid = candidate.id.0, subject = ?candidate.subject, "Subject not expected, skipping");
                    continue;
                }

                if let Some(value) = pick(self.inspect(candidate, selection, link)) {
                    session.mark_consumed(candidate.id).await?;
                    debug!(uid = candidate.id.0, "Consumed qualifying message");
                    return Ok(value);
                }
            }

            let now = Instant::now();
            if now >= state.deadline {
                return Err(Error::WaitTimeout {
                    address: filter.recipient.clone(),
                    waited: now.duration_since(state.started),
                });
            }

            tokio::time::sleep(state.next_sleep(now)).await;
        }
    }

    /// Normalizes one candidate and runs the extractors the selection needs.
    fn inspect(
        &self,
        candidate: &CandidateMessage,
        selection: Selection,
        link: Option<&LinkExtractor>,
    ) -> ExtractionResult {
        let uid = candidate.id.0;
        let body = parser::normalize(&candidate.raw);
        if body.is_empty() {
            debug!(uid, "Message body empty or undecodable");
            return ExtractionResult::default();
        }

        let result = ExtractionResult {
            code: if selection.wants_code() {
                self.code.extract(&body)
            } else {
                None
            },
            link: link.and_then(|extractor| extractor.extract(&body)),
        };

        if !result.satisfies(selection) {
            debug!(
                uid,
                found_code = result.code.is_some(),
                found_link = result.link.is_some(),
                preview = %html::preview(&body.plain_text, PREVIEW_CHARS),
                "Message does not satisfy selection"
            );
        }
        result
    }

    /// Calculates the IMAP SINCE date from the configured lookback.
    fn since_date(&self) -> NaiveDate {
        let lookback =
            chrono::Duration::from_std(self.polling.lookback).unwrap_or(chrono::Duration::zero());
        (Utc::now() - lookback).date_naive()
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for InboxRetriever<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxRetriever")
            .field("connector", &self.connector)
            .field("polling", &self.polling)
            .field("link", &self.link)
            .field("invite_subjects", &self.invite_subjects)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies() {
        let code_only = ExtractionResult {
            code: Some("123456".into()),
            link: None,
        };
        assert!(code_only.satisfies(Selection::Code));
        assert!(!code_only.satisfies(Selection::Link));
        assert!(!code_only.satisfies(Selection::Both));

        let both = ExtractionResult {
            code: Some("123456".into()),
            link: Some("https://app.example.com/invite?token=x".into()),
        };
        assert!(both.satisfies(Selection::Both));
        assert!(!ExtractionResult::default().satisfies(Selection::Code));
    }

    #[test]
    fn test_next_sleep_never_passes_deadline() {
        let start = Instant::now();
        let state = PollState::new(start, Duration::from_millis(50), Duration::from_millis(20));
        assert_eq!(state.next_sleep(start), Duration::from_millis(20));
        assert_eq!(
            state.next_sleep(start + Duration::from_millis(40)),
            Duration::from_millis(10)
        );
        assert_eq!(
            state.next_sleep(start + Duration::from_millis(80)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_huge_max_wait_does_not_overflow() {
        let start = Instant::now();
        let state = PollState::new(start, Duration::MAX, Duration::from_secs(2));
        assert!(state.deadline > start + Duration::from_secs(86_400 * 365));
        assert_eq!(state.next_sleep(start), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_interval_raised_to_minimum() {
        let polling = PollingConfig {
            interval: Duration::ZERO,
            ..PollingConfig::default()
        };
        let retriever = InboxRetriever::new(
            crate::memory::InMemoryMailbox::new(),
            polling,
            &ExtractionConfig::default(),
        );
        assert_eq!(retriever.polling.interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_selection_display() {
        assert_eq!(Selection::Both.to_string(), "link+code");
    }
}
