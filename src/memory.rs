//! In-process mailbox for tests.
//!
//! [`InMemoryMailbox`] is a cheap, cloneable handle; every clone sees the same
//! messages, so a test can keep delivering mail while a retrieval polls.
//!
//! ```
//! use inbox_otp::memory::InMemoryMailbox;
//!
//! let mailbox = InMemoryMailbox::new();
//! let id = mailbox.deliver(b"To: qa+1@example.com\r\nSubject: Code\r\n\r\nCode: 123456".to_vec());
//! assert_eq!(mailbox.is_seen(id), Some(false));
//! ```

use crate::error::{Error, Result};
use crate::parser;
use crate::transport::{
    CandidateFilter, CandidateMessage, MailboxConnector, MailboxSession, MessageId,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::debug;

const TARGET: &str = "in-memory mailbox";

#[derive(Debug)]
struct StoredMessage {
    id: MessageId,
    raw: Vec<u8>,
    received: NaiveDate,
    seen: bool,
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<StoredMessage>,
    last_uid: u32,
    unavailable: bool,
    failing_fetches: bool,
    opened: usize,
    closed: usize,
}

/// Shared in-memory mailbox implementing [`MailboxConnector`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailbox {
    state: Arc<Mutex<State>>,
}

impl InMemoryMailbox {
    /// Creates an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    /// Delivers a raw message received today and returns its id.
    pub fn deliver(&self, raw: impl Into<Vec<u8>>) -> MessageId {
        self.deliver_on(raw, Utc::now().date_naive())
    }

    /// Delivers a raw message with an explicit receive date.
    pub fn deliver_on(&self, raw: impl Into<Vec<u8>>, received: NaiveDate) -> MessageId {
        let mut state = self.state();
        state.last_uid += 1;
        let id = MessageId(state.last_uid);
        state.messages.push(StoredMessage {
            id,
            raw: raw.into(),
            received,
            seen: false,
        });
        id
    }

    /// Read state of a message, `None` if it does not exist.
    #[must_use]
    pub fn is_seen(&self, id: MessageId) -> Option<bool> {
        self.state()
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.seen)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().messages.len()
    }

    /// Returns `true` if no message was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes [`open`](MailboxConnector::open) fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes every fetch on open sessions fail with a connection error.
    pub fn set_failing_fetches(&self, failing: bool) {
        self.state().failing_fetches = failing;
    }

    /// Sessions opened so far.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.state().opened
    }

    /// Sessions closed so far.
    #[must_use]
    pub fn sessions_closed(&self) -> usize {
        self.state().closed
    }
}

fn unreachable_mailbox(kind: std::io::ErrorKind, message: &str) -> Error {
    Error::TcpConnect {
        target: TARGET.to_string(),
        source: std::io::Error::new(kind, message.to_string()),
    }
}

#[async_trait]
impl MailboxConnector for InMemoryMailbox {
    type Session = InMemorySession;

    async fn open(&self) -> Result<InMemorySession> {
        let mut state = self.state();
        if state.unavailable {
            return Err(unreachable_mailbox(
                std::io::ErrorKind::ConnectionRefused,
                "mailbox unavailable",
            ));
        }
        state.opened += 1;
        Ok(InMemorySession {
            mailbox: self.clone(),
        })
    }
}

/// Session on an [`InMemoryMailbox`].
#[derive(Debug)]
pub struct InMemorySession {
    mailbox: InMemoryMailbox,
}

#[async_trait]
impl MailboxSession for InMemorySession {
    async fn fetch_candidates(
        &mut self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateMessage>> {
        let state = self.mailbox.state();
        if state.failing_fetches {
            return Err(unreachable_mailbox(
                std::io::ErrorKind::ConnectionReset,
                "connection reset during fetch",
            ));
        }

        let candidates: Vec<CandidateMessage> = state
            .messages
            .iter()
            .filter(|m| filter.since.map_or(true, |since| m.received >= since))
            .map(|m| {
                let envelope = parser::parse_envelope(&m.raw);
                CandidateMessage {
                    id: m.id,
                    recipients: envelope.recipients,
                    subject: envelope.subject,
                    raw: m.raw.clone(),
                    seen: m.seen,
                }
            })
            .filter(|candidate| filter.matches(candidate))
            .collect();

        debug!(
            recipient = %filter.recipient,
            candidates = candidates.len(),
            "Fetched in-memory candidates"
        );
        Ok(candidates)
    }

    async fn mark_consumed(&mut self, id: MessageId) -> Result<()> {
        if let Some(message) = self
            .mailbox
            .state()
            .messages
            .iter_mut()
            .find(|m| m.id == id)
        {
            message.seen = true;
        }
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.mailbox.state().closed += 1;
        Ok(())
    }
}
