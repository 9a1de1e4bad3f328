//! Configuration for mailbox access, polling and extraction.
//!
//! Use [`ImapConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use inbox_otp::ImapConfig;
//!
//! let config = ImapConfig::builder()
//!     .email("qa@gmail.com")
//!     .password("app-password")
//!     .app_domain("app.example.com")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.effective_imap_host(), "imap.gmail.com");
//! ```
//!
//! Credentials are always passed explicitly. [`ImapConfig::from_env`] is a
//! convenience for test harnesses and reads the environment once, at the
//! call site, not at load time.

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::time::Duration;

/// Environment variable holding the mailbox account.
pub const ENV_EMAIL: &str = "INBOX_OTP_EMAIL";
/// Environment variable holding the app-level password.
pub const ENV_PASSWORD: &str = "INBOX_OTP_PASSWORD";
/// Environment variable overriding the IMAP host.
pub const ENV_IMAP_HOST: &str = "INBOX_OTP_IMAP_HOST";
/// Environment variable overriding the IMAP port.
pub const ENV_IMAP_PORT: &str = "INBOX_OTP_IMAP_PORT";
/// Environment variable naming the application domain used in invitation links.
pub const ENV_APP_DOMAIN: &str = "INBOX_OTP_APP_DOMAIN";

/// Configuration for connecting to an IMAP mailbox.
///
/// Create using [`ImapConfig::builder()`].
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials.
#[derive(Clone)]
pub struct ImapConfig {
    /// Mailbox account (used for login and IMAP server discovery).
    email: EmailAddress,
    /// App-specific password (protected from accidental logging).
    password: SecretString,
    /// IMAP server hostname (auto-discovered from email domain if not set).
    pub imap_host: Option<String>,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Polling configuration for waiting operations.
    pub polling: PollingConfig,
    /// What counts as a code, a link and an invitation.
    pub extraction: ExtractionConfig,
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("timeouts", &self.timeouts)
            .field("polling", &self.polling)
            .field("extraction", &self.extraction)
            .finish()
    }
}

impl ImapConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ImapConfigBuilder {
        ImapConfigBuilder::default()
    }

    /// Builds a configuration from `INBOX_OTP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a required variable is missing or
    /// the port is not a number, and [`Error::InvalidEmailFormat`] for a bad account.
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            env::var(name).map_err(|_| Error::InvalidConfig {
                message: format!("{name} is not set"),
            })
        };

        let mut builder = Self::builder()
            .email(required(ENV_EMAIL)?)
            .password(required(ENV_PASSWORD)?);

        if let Ok(host) = env::var(ENV_IMAP_HOST) {
            builder = builder.imap_host(host);
        }
        if let Ok(port) = env::var(ENV_IMAP_PORT) {
            let port = port.parse().map_err(|_| Error::InvalidConfig {
                message: format!("{ENV_IMAP_PORT} must be a port number, got '{port}'"),
            })?;
            builder = builder.imap_port(port);
        }
        if let Ok(domain) = env::var(ENV_APP_DOMAIN) {
            builder = builder.app_domain(domain);
        }

        builder.build()
    }

    /// Returns the mailbox account as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent accidental logging.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the effective IMAP host, either explicitly configured or derived from email domain.
    #[must_use]
    pub fn effective_imap_host(&self) -> String {
        match &self.imap_host {
            Some(host) => host.clone(),
            None => discover_imap_host(self.email.as_str()),
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.effective_imap_host(), self.imap_port)
    }
}

/// Resolves the IMAP host for an account's domain.
///
/// Known providers map to their documented hosts; anything else falls back
/// to `imap.{domain}`.
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    let domain = email.rsplit('@').next().unwrap_or(email).to_lowercase();

    let known = match domain.as_str() {
        "gmail.com" | "googlemail.com" => Some("imap.gmail.com"),
        "outlook.com" | "hotmail.com" | "live.com" => Some("imap-mail.outlook.com"),
        "yahoo.com" => Some("imap.mail.yahoo.com"),
        "icloud.com" | "me.com" | "mac.com" => Some("imap.mail.me.com"),
        _ => None,
    };

    known.map_or_else(|| format!("imap.{domain}"), str::to_string)
}

/// Timeout configuration for individual IMAP operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for a UID search.
    pub search: Duration,
    /// Timeout for fetching message content.
    pub message_fetch: Duration,
    /// Timeout for flagging a message as seen.
    pub store: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            message_fetch: Duration::from_secs(30),
            store: Duration::from_secs(10),
            logout: Duration::from_secs(5),
        }
    }
}

/// Polling configuration for wait operations.
///
/// The maximum wait is supplied per call; only the cadence lives here.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval between polling attempts when waiting for email.
    pub interval: Duration,
    /// How far back the server-side search looks (IMAP `SINCE`, day granularity).
    pub lookback: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            lookback: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Extraction settings shared by the code and link extractors.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Domain token an invitation URL must contain (e.g. `app.example.com`).
    pub app_domain: Option<String>,
    /// Marker identifying a tokenized link (tiers 1 and 2).
    pub token_marker: String,
    /// Path segments identifying a registration/invite flow (tier 3).
    pub invite_paths: Vec<String>,
    /// Subject fragments accepted for invitation mail; empty accepts any subject.
    pub invite_subjects: Vec<String>,
    /// Subject fragments accepted for code-only mail; empty accepts any subject.
    pub code_subjects: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            app_domain: None,
            token_marker: "token".to_string(),
            invite_paths: ["register", "invite", "signup", "accept"]
                .into_iter()
                .map(String::from)
                .collect(),
            invite_subjects: vec!["invit".to_string(), "welcome to".to_string()],
            code_subjects: Vec::new(),
        }
    }
}

/// Validates an email address format.
pub(crate) fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`ImapConfig`].
#[derive(Debug, Default)]
pub struct ImapConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
    extraction: Option<ExtractionConfig>,
}

impl ImapConfigBuilder {
    /// Sets the mailbox account (required).
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required).
    ///
    /// For Gmail/Outlook, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the polling interval for wait operations.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets extraction configuration.
    #[must_use]
    pub fn extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = Some(extraction);
        self
    }

    /// Sets the application domain invitation links must point at.
    #[must_use]
    pub fn app_domain(mut self, domain: impl Into<String>) -> Self {
        self.extraction
            .get_or_insert_with(ExtractionConfig::default)
            .app_domain = Some(domain.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<ImapConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;
        let email = validate_email(&email_raw)?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let polling = self.polling.unwrap_or_default();
        if polling.interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be greater than zero".into(),
            });
        }

        Ok(ImapConfig {
            email,
            password: SecretString::from(password_raw),
            imap_host: self.imap_host,
            imap_port: self.imap_port.unwrap_or(993),
            timeouts: self.timeouts.unwrap_or_default(),
            polling,
            extraction: self.extraction.unwrap_or_default(),
        })
    }
}
