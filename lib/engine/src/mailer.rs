//! Email sender seam.
//!
//! `action.notify_email` talks to an external notification service over
//! HTTP. The engine consumes the [`Mailer`] trait; the production
//! implementation posts JSON to the service's `/send/notify` endpoint with a
//! 10 second per-request deadline.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Fallback display name for recipients without one.
pub const DEFAULT_RECIPIENT_NAME: &str = "resident";

/// Per-request deadline for the notification service.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the email sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// The request could not be sent or timed out.
    RequestFailed { message: String },
    /// The service answered with a non-success status.
    Rejected { status: u16 },
}

impl fmt::Display for MailerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { message } => write!(f, "mail request failed: {message}"),
            Self::Rejected { status } => write!(f, "mail endpoint returned status {status}"),
        }
    }
}

impl std::error::Error for MailerError {}

/// The outbound email interface.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one notification email.
    ///
    /// Implementations enforce a bounded per-request deadline; a slow or
    /// failing service must not stall a run indefinitely.
    async fn send(
        &self,
        to: &str,
        user_name: &str,
        subject: &str,
        message: &str,
    ) -> Result<(), MailerError>;
}

#[derive(Serialize)]
struct NotifyRequest<'a> {
    to: &'a str,
    user_name: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// The production mailer over HTTP.
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMailer {
    /// Creates a mailer for the notification service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| MailerError::RequestFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &str,
        user_name: &str,
        subject: &str,
        message: &str,
    ) -> Result<(), MailerError> {
        let url = format!("{}/send/notify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&NotifyRequest {
                to,
                user_name,
                subject,
                message,
            })
            .send()
            .await
            .map_err(|e| MailerError::RequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(MailerError::Rejected {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_error_display() {
        let err = MailerError::Rejected { status: 500 };
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let mailer = HttpMailer::new("http://mail.local/").expect("client");
        assert_eq!(mailer.base_url, "http://mail.local");
    }
}
