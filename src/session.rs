//! Internal IMAP session commands.
//!
//! Thin wrappers over async-imap that attach context to every error.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use crate::transport::CandidateFilter;
use async_imap::types::Fetch;
use async_imap::Session;
use futures::TryStreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Fetch items: UID and flags plus the full source without setting `\Seen`.
const FETCH_ITEMS: &str = "(UID FLAGS BODY.PEEK[])";

/// Authenticates to IMAP server and returns a session.
#[instrument(name = "session::authenticate", skip_all, fields(email = %email))]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    email: &str,
    password: &str,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(email, password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: email.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    Ok(())
}

/// Builds the server-side search for a candidate filter.
///
/// `TO` is a substring search on the server, so callers still apply
/// [`CandidateFilter::matches`] to the results.
pub(crate) fn search_query(filter: &CandidateFilter) -> String {
    let mut parts = Vec::with_capacity(3);
    if filter.unread_only {
        parts.push("UNSEEN".to_string());
    }
    parts.push(format!("TO {}", quote(&filter.recipient)));
    if let Some(since) = filter.since {
        // IMAP SINCE format: "DD-Mon-YYYY" (e.g., "07-Dec-2025")
        parts.push(format!("SINCE {}", since.format("%d-%b-%Y")));
    }
    parts.join(" ")
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Runs a UID search, returning UIDs in ascending order.
#[instrument(name = "session::search", skip(session))]
pub(crate) async fn search(session: &mut ImapSession, query: &str) -> Result<Vec<u32>> {
    // NOOP so the server reports mail that arrived since the last poll
    session
        .noop()
        .await
        .map_err(|source| Error::ImapNoop { source })?;

    let uids = session
        .uid_search(query)
        .await
        .map_err(|source| Error::ImapSearch {
            query: query.to_string(),
            source,
        })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Search complete");

    Ok(uids)
}

/// Fetches full messages for a UID set.
pub(crate) async fn fetch_messages(session: &mut ImapSession, uid_set: &str) -> Result<Vec<Fetch>> {
    debug!(uid_set = %uid_set, "Fetching messages");

    let map_err = |source| Error::ImapFetch {
        uid_set: uid_set.to_string(),
        source,
    };

    session
        .uid_fetch(uid_set, FETCH_ITEMS)
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)
}

/// Adds `\Seen` to one message.
#[instrument(name = "session::mark_seen", skip(session))]
pub(crate) async fn mark_seen(session: &mut ImapSession, uid: u32) -> Result<()> {
    let map_err = |source| Error::ImapStore { uid, source };

    let _updates: Vec<Fetch> = session
        .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)?;

    Ok(())
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })
}
