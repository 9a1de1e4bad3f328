//! Demo: wait for an invitation mail carrying both a link and a code.
//!
//! # Usage
//!
//! ```bash
//! export INBOX_OTP_EMAIL="your@email.com"
//! export INBOX_OTP_PASSWORD="your-app-password"
//! export INBOX_OTP_APP_DOMAIN="app.example.com"
//! export RUST_LOG=inbox_otp=debug
//!
//! cargo run --example invite_data -- qa+invite42@your-domain.com
//! ```

use inbox_otp::{ImapConfig, InboxRetriever};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> inbox_otp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inbox_otp=info")),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = ImapConfig::from_env()?;
    let address = env::args()
        .nth(1)
        .unwrap_or_else(|| config.email().to_string());

    tracing::info!(address = %address, "Waiting for invitation");

    let invite = InboxRetriever::imap(config)
        .get_invite_data(&address, Duration::from_secs(90))
        .await?;

    println!("Link: {}", invite.link);
    println!("Code: {}", invite.code);

    Ok(())
}
