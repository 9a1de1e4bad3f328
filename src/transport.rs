//! Mailbox access seam.
//!
//! The retriever only talks to a mailbox through [`MailboxConnector`] and
//! [`MailboxSession`]. [`ImapConnector`](crate::imap::ImapConnector) is the
//! production implementation; [`InMemoryMailbox`](crate::memory::InMemoryMailbox)
//! backs tests.

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Mailbox-assigned message identifier (an IMAP UID). Higher is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One fetched message considered during a poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMessage {
    /// Mailbox-assigned identifier.
    pub id: MessageId,
    /// Recipient addresses from `To`, `Cc` and `Delivered-To`.
    pub recipients: Vec<String>,
    /// Decoded subject line.
    pub subject: Option<String>,
    /// Raw RFC 822 source.
    pub raw: Vec<u8>,
    /// Whether the message was already flagged as read.
    pub seen: bool,
}

impl CandidateMessage {
    /// Returns `true` if the subject contains any of `fragments`
    /// (case-insensitive). An empty list accepts every message.
    #[must_use]
    pub fn subject_matches(&self, fragments: &[String]) -> bool {
        if fragments.is_empty() {
            return true;
        }
        let subject = self.subject.as_deref().unwrap_or_default().to_lowercase();
        fragments
            .iter()
            .any(|fragment| subject.contains(&fragment.to_lowercase()))
    }
}

/// Which messages a fetch should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Full recipient address, alias tag included.
    pub recipient: String,
    /// Skip messages already flagged as read.
    pub unread_only: bool,
    /// Only messages received on or after this date.
    pub since: Option<NaiveDate>,
}

impl CandidateFilter {
    /// Filter for unread messages to `recipient`.
    #[must_use]
    pub fn unread_for(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            unread_only: true,
            since: None,
        }
    }

    /// Restricts the filter to messages received on or after `date`.
    #[must_use]
    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Client-side check of recipient and read state.
    ///
    /// The recipient must equal the filter address as a whole (ASCII
    /// case-insensitive), so `qa+1@x` never matches `qa+12@x` or `qa@x`.
    /// The date bound is left to the mailbox.
    #[must_use]
    pub fn matches(&self, message: &CandidateMessage) -> bool {
        if self.unread_only && message.seen {
            return false;
        }
        message
            .recipients
            .iter()
            .any(|r| r.trim().eq_ignore_ascii_case(self.recipient.trim()))
    }
}

/// Opens sessions on one mailbox.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Session type produced by [`open`](Self::open).
    type Session: MailboxSession;

    /// Establishes an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns a connection error on network or authentication failure.
    async fn open(&self) -> Result<Self::Session>;
}

/// An open, exclusively owned mailbox session.
#[async_trait]
pub trait MailboxSession: Send {
    /// Returns a snapshot of the messages matching `filter`, oldest first.
    ///
    /// Read-only: fetching never changes a message's read state.
    async fn fetch_candidates(&mut self, filter: &CandidateFilter)
        -> Result<Vec<CandidateMessage>>;

    /// Flags a message as read so unread-only fetches skip it. Idempotent.
    async fn mark_consumed(&mut self, id: MessageId) -> Result<()>;

    /// Releases the session.
    async fn close(self) -> Result<()>;
}
