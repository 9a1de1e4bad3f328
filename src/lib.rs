//! # inbox-otp
//!
//! Async retrieval of one-time codes and invitation links from a real mailbox.
//!
//! Automated signup and login flows send a code or an invite link by email.
//! This crate polls an IMAP inbox for unread mail addressed to one recipient,
//! extracts the code or link, marks the message read and returns it:
//!
//! - Many test identities can share one inbox through address tagging
//!   (`qa+signup42@gmail.com`, see [`alias`])
//! - Bodies are normalized from plain text, HTML and quoted-printable parts
//! - Codes are found by a prioritized rule table ([`code`]); links by domain,
//!   path and token heuristics ([`link`])
//! - Every call has a hard deadline and always closes its session
//!
//! ## Quick Start
//!
//! ```no_run
//! use inbox_otp::{alias, ImapConfig, InboxRetriever};
//! use std::time::Duration;
//!
//! # async fn example() -> inbox_otp::Result<()> {
//! let config = ImapConfig::builder()
//!     .email("qa@gmail.com")
//!     .password("app-password")  // Use app-specific password for Gmail
//!     .app_domain("app.example.com")
//!     .build()?;
//!
//! let retriever = InboxRetriever::imap(config);
//!
//! // Give this run its own recipient, then trigger the signup with it
//! let address = alias::unique_tag_address("qa@gmail.com")?;
//!
//! let invite = retriever
//!     .get_invite_data(&address, Duration::from_secs(90))
//!     .await?;
//! println!("{} / {}", invite.link, invite.code);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Without a Server
//!
//! ```
//! use inbox_otp::memory::InMemoryMailbox;
//! use inbox_otp::{ExtractionConfig, InboxRetriever, PollingConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> inbox_otp::Result<()> {
//! let mailbox = InMemoryMailbox::new();
//! mailbox.deliver(
//!     b"To: qa+7@example.com\r\nSubject: Your code\r\n\r\nYour verification code is 204981".to_vec(),
//! );
//!
//! let retriever = InboxRetriever::new(
//!     mailbox.clone(),
//!     PollingConfig::default(),
//!     &ExtractionConfig::default(),
//! );
//! let code = retriever
//!     .get_one_time_code("qa+7@example.com", Duration::from_secs(1))
//!     .await?;
//! assert_eq!(code, "204981");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. A call that
//! runs out of time returns [`Error::WaitTimeout`]; mailbox failures are
//! reported by [`Error::is_connection_error`]:
//!
//! ```
//! use inbox_otp::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_wait_timeout() {
//!         println!("Mail never arrived: {}", error);
//!     } else if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation and installs no subscriber.
//!
//! ### Span Naming Convention
//!
//! - `InboxRetriever::get_one_time_code` / `get_invite_link` / `get_invite_data` / `wait_for`
//! - `ImapConnector::open` - Connect, login and select
//! - `ImapMailboxSession::fetch_candidates` - One poll
//! - `ImapMailboxSession::mark_consumed` - Flag a message `\Seen`
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `address` - Awaited recipient
//! - `selection` - What the call waits for
//! - `poll` - Poll number within a call
//! - `uid` - Message UID

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod alias;
pub mod code;
pub mod config;
pub mod error;
pub mod html;
pub mod imap;
pub mod link;
pub mod matcher;
pub mod memory;
pub mod parser;
pub mod retriever;
pub mod transport;

// Internal modules
mod connection;
mod session;

// Re-exports for ergonomic API
pub use code::{CodeExtractor, CodeRule};
pub use config::{
    ExtractionConfig, ImapConfig, ImapConfigBuilder, PollingConfig, TimeoutConfig,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use imap::ImapConnector;
pub use link::LinkExtractor;
pub use parser::NormalizedBody;
pub use retriever::{ExtractionResult, InboxRetriever, InviteData, Selection};
pub use transport::{CandidateFilter, CandidateMessage, MailboxConnector, MailboxSession, MessageId};
