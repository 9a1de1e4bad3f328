//! Demo: wait for a one-time code sent to a tagged address.
//!
//! Generates a fresh `+tag` alias, prints it so you can trigger a login or
//! signup with it, then waits up to two minutes for the code.
//!
//! # Usage
//!
//! ```bash
//! export INBOX_OTP_EMAIL="your@email.com"
//! export INBOX_OTP_PASSWORD="your-app-password"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=inbox_otp=debug
//!
//! cargo run --example one_time_code
//! ```

use inbox_otp::{alias, ImapConfig, InboxRetriever};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> inbox_otp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inbox_otp=info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .init();

    dotenvy::dotenv().ok();
    let config = ImapConfig::from_env()?;

    let address = alias::unique_tag_address(config.email())?;
    println!("Send the code to: {address}");

    let retriever = InboxRetriever::imap(config);

    match retriever
        .get_one_time_code(&address, Duration::from_secs(120))
        .await
    {
        Ok(code) => {
            tracing::info!(otp = %code, "Found OTP code");
            println!("\nFound OTP: {code}");
        }
        Err(e) if e.is_wait_timeout() => {
            println!("\nNo code arrived: {e}");
        }
        Err(e) => {
            println!("\nMailbox error ({}): {e}", e.category());
            return Err(e);
        }
    }

    Ok(())
}
