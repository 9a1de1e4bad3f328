//! IMAP implementation of the mailbox seam.

use crate::config::{ImapConfig, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::parser;
use crate::session::{self, ImapSession};
use crate::transport::{
    CandidateFilter, CandidateMessage, MailboxConnector, MailboxSession, MessageId,
};
use async_imap::types::{Fetch, Flag};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

const INBOX: &str = "INBOX";

/// Opens TLS-secured IMAP sessions on the INBOX of one account.
///
/// ```no_run
/// use inbox_otp::imap::ImapConnector;
/// use inbox_otp::transport::{CandidateFilter, MailboxConnector, MailboxSession};
/// use inbox_otp::ImapConfig;
///
/// # async fn example() -> inbox_otp::Result<()> {
/// let config = ImapConfig::builder()
///     .email("qa@gmail.com")
///     .password("app-password")
///     .build()?;
///
/// let mut session = ImapConnector::new(config).open().await?;
/// let unread = session
///     .fetch_candidates(&CandidateFilter::unread_for("qa+7@gmail.com"))
///     .await?;
/// println!("{} unread", unread.len());
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: ImapConfig,
}

impl ImapConnector {
    /// Creates a connector; no network activity happens until [`open`](MailboxConnector::open).
    #[must_use]
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// The configuration sessions are opened with.
    #[must_use]
    pub fn config(&self) -> &ImapConfig {
        &self.config
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    type Session = ImapMailboxSession;

    /// Connects, authenticates and selects the INBOX, each step under its own timeout.
    #[instrument(
        name = "ImapConnector::open",
        skip_all,
        fields(
            email = %self.config.email(),
            imap_host = %self.config.effective_imap_host()
        )
    )]
    async fn open(&self) -> Result<ImapMailboxSession> {
        let config = &self.config;
        let imap_host = config.effective_imap_host();
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&imap_host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, config.email(), config.password()),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: config.email().to_string(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        tokio::time::timeout(timeouts.select, session::select_mailbox(&mut session, INBOX))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: INBOX.to_string(),
                timeout: timeouts.select,
            })??;

        debug!("Selected INBOX");

        Ok(ImapMailboxSession {
            session: Box::new(session),
            timeouts: timeouts.clone(),
        })
    }
}

/// An authenticated IMAP session with the INBOX selected.
pub struct ImapMailboxSession {
    session: Box<ImapSession>,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapMailboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailboxSession")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailboxSession for ImapMailboxSession {
    #[instrument(
        name = "ImapMailboxSession::fetch_candidates",
        skip_all,
        fields(recipient = %filter.recipient, unread_only = filter.unread_only)
    )]
    async fn fetch_candidates(
        &mut self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateMessage>> {
        let query = session::search_query(filter);
        let search_timeout = self.timeouts.search;

        let uids = tokio::time::timeout(search_timeout, session::search(&mut self.session, &query))
            .await
            .map_err(|_| Error::SearchTimeout {
                timeout: search_timeout,
            })??;

        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetch_timeout = self.timeouts.message_fetch;

        let fetches = tokio::time::timeout(
            fetch_timeout,
            session::fetch_messages(&mut self.session, &uid_set),
        )
        .await
        .map_err(|_| Error::FetchTimeout {
            uid_set: uid_set.clone(),
            timeout: fetch_timeout,
        })??;

        let mut candidates: Vec<CandidateMessage> = fetches
            .iter()
            .filter_map(candidate_from_fetch)
            .filter(|candidate| filter.matches(candidate))
            .collect();
        candidates.sort_by_key(|candidate| candidate.id);

        debug!(
            searched = uids.len(),
            candidates = candidates.len(),
            "Fetched candidates"
        );

        Ok(candidates)
    }

    #[instrument(name = "ImapMailboxSession::mark_consumed", skip(self), fields(uid = id.0))]
    async fn mark_consumed(&mut self, id: MessageId) -> Result<()> {
        let store_timeout = self.timeouts.store;

        tokio::time::timeout(store_timeout, session::mark_seen(&mut self.session, id.0))
            .await
            .map_err(|_| Error::StoreTimeout {
                uid: id.0,
                timeout: store_timeout,
            })?
    }

    #[instrument(name = "ImapMailboxSession::close", skip(self))]
    async fn close(mut self) -> Result<()> {
        let logout_timeout = self.timeouts.logout;

        tokio::time::timeout(logout_timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout {
                timeout: logout_timeout,
            })?
    }
}

/// Converts a fetch response into a candidate; responses without UID or body are skipped.
fn candidate_from_fetch(fetch: &Fetch) -> Option<CandidateMessage> {
    let Some(uid) = fetch.uid else {
        warn!("Fetch response without UID, skipping");
        return None;
    };
    let Some(raw) = fetch.body() else {
        debug!(uid, "Message has no body");
        return None;
    };

    let envelope = parser::parse_envelope(raw);
    let seen = fetch.flags().any(|flag| matches!(flag, Flag::Seen));

    Some(CandidateMessage {
        id: MessageId(uid),
        recipients: envelope.recipients,
        subject: envelope.subject,
        raw: raw.to_vec(),
        seen,
    })
}
