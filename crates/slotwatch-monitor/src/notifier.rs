//! Outbound notifications.
//!
//! Delivery is best-effort: [`send_best_effort`] logs failures and lets the
//! cycle carry on.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use slotwatch_core::AppConfig;

use crate::error::NotifyError;

/// Subject line attached to every notification.
pub const SUBJECT: &str = "Available Hours";

const WEBHOOK_TIMEOUT_SECS: u64 = 15;

/// A channel that can deliver a text message to the operator.
pub trait Notifier {
    fn send(&self, message: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(subject = SUBJECT, message, "notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    text: &'a str,
}

/// Posts `{"subject": "Available Hours", "text": message}` to a URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            subject: SUBJECT,
            text: message,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(status = status.as_u16(), "webhook accepted notification");
        Ok(())
    }
}

/// The notifier selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredNotifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl ConfiguredNotifier {
    /// Webhook when `SLOTWATCH_WEBHOOK_URL` is set, log otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the webhook client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        match &config.webhook_url {
            Some(url) => Ok(Self::Webhook(WebhookNotifier::new(
                url.as_str(),
                &config.user_agent,
            )?)),
            None => Ok(Self::Log(LogNotifier)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Webhook(_) => "webhook",
        }
    }
}

impl Notifier for ConfiguredNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        match self {
            Self::Log(n) => n.send(message).await,
            Self::Webhook(n) => n.send(message).await,
        }
    }
}

/// Sends `message`, logging instead of returning a failure.
///
/// Returns `true` if the notifier accepted the message.
pub async fn send_best_effort<N: Notifier>(notifier: &N, message: &str) -> bool {
    match notifier.send(message).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, message, "failed to send notification");
            false
        }
    }
}
