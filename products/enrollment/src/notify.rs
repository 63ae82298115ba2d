//! Outbound notifications. Delivery providers live behind [`Notifier`];
//! nothing here retries, and callers treat failures as non-fatal.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Whatsapp,
}

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Welcome message for a freshly enrolled student, if any contact
    /// channel is known.
    pub fn welcome(
        name: &str,
        student_code: &str,
        email: Option<&str>,
        whatsapp: Option<&str>,
    ) -> Option<Self> {
        let (channel, recipient) = match (email, whatsapp) {
            (Some(email), _) if !email.trim().is_empty() => (Channel::Email, email),
            (_, Some(number)) if !number.trim().is_empty() => (Channel::Whatsapp, number),
            _ => return None,
        };
        Some(Self {
            channel,
            recipient: recipient.trim().to_string(),
            subject: format!("Welcome, {name}"),
            body: format!("Hi {name}, your enrollment is confirmed. Your student ID is {student_code}."),
        })
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification gateway answered {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            channel = ?notification.channel,
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification queued"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to an HTTP gateway.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_prefers_email_then_whatsapp() {
        let email = Notification::welcome("Asha", "STU-202601-0042", Some("a@b.io"), Some("+91"))
            .unwrap();
        assert_eq!(email.channel, Channel::Email);
        assert!(email.body.contains("STU-202601-0042"));

        let wa = Notification::welcome("Asha", "STU-202601-0042", Some("  "), Some("+4912345"))
            .unwrap();
        assert_eq!(wa.channel, Channel::Whatsapp);
        assert_eq!(wa.recipient, "+4912345");

        assert!(Notification::welcome("Asha", "STU-1", None, None).is_none());
    }
}
