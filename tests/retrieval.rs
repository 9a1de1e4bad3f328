//! Retrieval tests against the in-memory mailbox.
//!
//! Tokio's clock is paused, so poll intervals and deadlines advance
//! instantly and elapsed times are exact.

use inbox_otp::memory::InMemoryMailbox;
use inbox_otp::{
    Error, ExtractionConfig, ExtractionResult, InboxRetriever, InviteData, PollingConfig,
    Selection,
};
use std::time::Duration;
use tokio::time::Instant;

const APP_DOMAIN: &str = "app.example.com";

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn message(to: &str, subject: &str, body: &str) -> Vec<u8> {
    format!("From: App <noreply@app.example.com>\r\nTo: {to}\r\nSubject: {subject}\r\n\r\n{body}")
        .into_bytes()
}

fn welcome_message(to: &str) -> Vec<u8> {
    format!(
        "From: App <noreply@app.example.com>\r\n\
To: {to}\r\n\
Subject: Welcome to Acme on App\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Here's your OTP to complete the registration:\r\n\
\r\n\
117734\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<a href=3D\"https://app.example.com/auth/register/otp?token&#x3D;XYZ\">Join</a>\r\n\
--b1--\r\n"
    )
    .into_bytes()
}

fn corrupt_message(to: &str) -> Vec<u8> {
    format!(
        "To: {to}\r\nSubject: Code\r\nContent-Type: text/plain\r\n\
Content-Transfer-Encoding: base64\r\n\r\n@@@@ not base64 @@@@"
    )
    .into_bytes()
}

fn retriever(mailbox: &InMemoryMailbox) -> InboxRetriever<InMemoryMailbox> {
    let polling = PollingConfig {
        interval: Duration::from_millis(500),
        ..PollingConfig::default()
    };
    let extraction = ExtractionConfig {
        app_domain: Some(APP_DOMAIN.to_string()),
        ..ExtractionConfig::default()
    };
    InboxRetriever::new(mailbox.clone(), polling, &extraction)
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_invite_data_from_welcome_mail() {
    let mailbox = InMemoryMailbox::new();
    let id = mailbox.deliver(welcome_message("qa+42@example.com"));

    let invite = retriever(&mailbox)
        .get_invite_data("qa+42@example.com", Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(
        invite,
        InviteData {
            link: "https://app.example.com/auth/register/otp?token=XYZ".to_string(),
            code: "117734".to_string(),
        }
    );
    assert_eq!(mailbox.is_seen(id), Some(true));
    assert_eq!(mailbox.sessions_opened(), 1);
    assert_eq!(mailbox.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invite_link_and_wait_for() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(welcome_message("qa+1@example.com"));
    mailbox.deliver(welcome_message("qa+2@example.com"));
    let r = retriever(&mailbox);

    let link = r
        .get_invite_link("qa+1@example.com", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(link, "https://app.example.com/auth/register/otp?token=XYZ");

    let result = r
        .wait_for("qa+2@example.com", Selection::Both, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        result,
        ExtractionResult {
            code: Some("117734".to_string()),
            link: Some(link),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_one_time_code_from_plain_mail() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message(
        "user+login@example.com",
        "Your sign-in code",
        "Your OTP: 482913. Order #1234 confirmed.",
    ));

    let code = retriever(&mailbox)
        .get_one_time_code("user+login@example.com", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(code, "482913");
}

// ─────────────────────────────────────────────────────────────────────────────
// Recipient and subject filtering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_only_awaited_recipient_is_considered() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("user+a@example.com", "Code", "Code: 111111"));
    let other = mailbox.deliver(message("user+b@example.com", "Code", "Code: 222222"));

    let code = retriever(&mailbox)
        .get_one_time_code("user+a@example.com", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(code, "111111");
    assert_eq!(mailbox.is_seen(other), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_newest_message_wins() {
    let mailbox = InMemoryMailbox::new();
    let older = mailbox.deliver(message("qa+7@example.com", "Code", "Code: 111111"));
    let newer = mailbox.deliver(message("qa+7@example.com", "Code", "Code: 222222"));

    let code = retriever(&mailbox)
        .get_one_time_code("qa+7@example.com", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(code, "222222");
    assert_eq!(mailbox.is_seen(newer), Some(true));
    assert_eq!(mailbox.is_seen(older), Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_invite_requires_invite_subject() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message(
        "qa+9@example.com",
        "Your receipt",
        "See https://app.example.com/invite?token=abc",
    ));

    let err = retriever(&mailbox)
        .get_invite_link("qa+9@example.com", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(err.is_wait_timeout());

    mailbox.deliver(message(
        "qa+9@example.com",
        "You have been invited",
        "See https://app.example.com/invite?token=abc",
    ));
    let link = retriever(&mailbox)
        .get_invite_link("qa+9@example.com", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(link, "https://app.example.com/invite?token=abc");
}

#[tokio::test(start_paused = true)]
async fn test_invite_data_needs_both_in_one_message() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("qa+3@example.com", "Welcome to App", "Code: 123456"));

    let err = retriever(&mailbox)
        .get_invite_data("qa+3@example.com", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_wait_timeout());
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumption
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_consumed_message_is_not_returned_again() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("qa+5@example.com", "Code", "Code: 111111"));
    let r = retriever(&mailbox);

    let first = r
        .get_one_time_code("qa+5@example.com", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(first, "111111");

    let err = r
        .get_one_time_code("qa+5@example.com", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_wait_timeout());

    mailbox.deliver(message("qa+5@example.com", "Code", "Code: 222222"));
    let second = r
        .get_one_time_code("qa+5@example.com", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(second, "222222");
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling and deadlines
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeout_on_empty_mailbox() {
    let mailbox = InMemoryMailbox::new();
    let started = Instant::now();

    let err = retriever(&mailbox)
        .get_one_time_code("nobody@example.com", Duration::from_millis(50))
        .await
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100));

    match err {
        Error::WaitTimeout { address, waited } => {
            assert_eq!(address, "nobody@example.com");
            assert!(waited >= Duration::from_millis(50));
        }
        other => panic!("expected WaitTimeout, got {other:?}"),
    }
    assert_eq!(mailbox.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_wait_polls_once() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("qa@example.com", "Code", "Code: 654321"));
    let r = retriever(&mailbox);

    let code = r
        .get_one_time_code("qa@example.com", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(code, "654321");

    let err = r
        .get_one_time_code("qa@example.com", Duration::ZERO)
        .await
        .unwrap_err();
    assert!(err.is_wait_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_wait_returns_waiting_code() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("qa@example.com", "Code", "Code: 123456"));

    let code = retriever(&mailbox)
        .get_one_time_code("qa@example.com", Duration::MAX)
        .await
        .unwrap();
    assert_eq!(code, "123456");
    assert_eq!(mailbox.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_still_paces_polls() {
    let mailbox = InMemoryMailbox::new();
    let polling = PollingConfig {
        interval: Duration::ZERO,
        ..PollingConfig::default()
    };
    let r = InboxRetriever::new(mailbox.clone(), polling, &ExtractionConfig::default());
    let started = Instant::now();

    let err = r
        .get_one_time_code("qa@example.com", Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(err.is_wait_timeout());
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_mail_arriving_while_polling() {
    let mailbox = InMemoryMailbox::new();
    let late = mailbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        late.deliver(message("qa+late@example.com", "Code", "Your code is 908172"));
    });

    let started = Instant::now();
    let code = retriever(&mailbox)
        .get_one_time_code("qa+late@example.com", Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(code, "908172");
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_message_does_not_abort_poll() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(message("qa+p8@example.com", "Code", "Code: 313131"));
    // Newest first, so the corrupt one is inspected before the valid one
    mailbox.deliver(corrupt_message("qa+p8@example.com"));

    let code = retriever(&mailbox)
        .get_one_time_code("qa+p8@example.com", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(code, "313131");
}

#[tokio::test(start_paused = true)]
async fn test_valid_message_after_unparseable_one() {
    let mailbox = InMemoryMailbox::new();
    mailbox.deliver(corrupt_message("qa+p8b@example.com"));
    mailbox.deliver(message("qa+p8b@example.com", "Hello", "Nothing to see here"));

    let late = mailbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        late.deliver(message("qa+p8b@example.com", "Code", "Code: 777888"));
    });

    let code = retriever(&mailbox)
        .get_one_time_code("qa+p8b@example.com", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(code, "777888");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_retrievals_are_independent() {
    let mailbox = InMemoryMailbox::new();
    let r = retriever(&mailbox);

    let late = mailbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        late.deliver(message("qa+b@example.com", "Code", "Code: 222222"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        late.deliver(message("qa+a@example.com", "Code", "Code: 111111"));
    });

    let (a, b) = tokio::join!(
        r.get_one_time_code("qa+a@example.com", Duration::from_secs(10)),
        r.get_one_time_code("qa+b@example.com", Duration::from_secs(10)),
    );

    assert_eq!(a.unwrap(), "111111");
    assert_eq!(b.unwrap(), "222222");
    assert_eq!(mailbox.sessions_opened(), 2);
    assert_eq!(mailbox.sessions_closed(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_connection_failure_propagates_and_closes_session() {
    let mailbox = InMemoryMailbox::new();
    mailbox.set_failing_fetches(true);

    let err = retriever(&mailbox)
        .get_one_time_code("qa@example.com", Duration::from_secs(10))
        .await
        .unwrap_err();

    assert!(err.is_connection_error());
    assert!(!err.is_wait_timeout());
    assert_eq!(mailbox.sessions_opened(), 1);
    assert_eq!(mailbox.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_mailbox_fails_fast() {
    let mailbox = InMemoryMailbox::new();
    mailbox.set_unavailable(true);
    let started = Instant::now();

    let err = retriever(&mailbox)
        .get_one_time_code("qa@example.com", Duration::from_secs(10))
        .await
        .unwrap_err();

    assert!(err.is_connection_error());
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(mailbox.sessions_opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_address_rejected_before_connecting() {
    let mailbox = InMemoryMailbox::new();

    let err = retriever(&mailbox)
        .get_one_time_code("not-an-email", Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidEmailFormat { .. }));
    assert_eq!(mailbox.sessions_opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_link_retrieval_requires_app_domain() {
    let mailbox = InMemoryMailbox::new();
    let r = InboxRetriever::new(
        mailbox.clone(),
        PollingConfig::default(),
        &ExtractionConfig::default(),
    );

    let err = r
        .get_invite_link("qa@example.com", Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidConfig { .. }));
    assert_eq!(mailbox.sessions_opened(), 0);
}
