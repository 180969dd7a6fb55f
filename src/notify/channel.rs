//! External notification channels

use super::event::NotificationEvent;
use crate::types::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// Timeout for a single webhook call
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// A destination for decision notifications
///
/// Delivery is attempted by the dispatcher's background worker; a channel only
/// reports whether one attempt succeeded.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name used in logs and errors
    fn name(&self) -> &str;

    /// Deliver one event
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// HTTP webhook posting the event as a JSON body
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    name: String,
    url: String,
    client: Client,
}

impl WebhookChannel {
    /// Create a webhook channel for `url`
    ///
    /// # Arguments
    ///
    /// * `name` - Channel name used in logs
    /// * `url` - Endpoint receiving `POST` requests
    ///
    /// # Returns
    ///
    /// * `Ok(WebhookChannel)` - Ready to deliver
    /// * `Err(NotifyError::Transport)` - If the HTTP client could not be built
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, NotifyError> {
        let name = name.into();
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport {
                channel: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                // reqwest reports a body that failed to serialize as a builder error
                if e.is_builder() {
                    NotifyError::Serialization {
                        channel: self.name.clone(),
                        message: e.to_string(),
                    }
                } else {
                    NotifyError::Transport {
                        channel: self.name.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                channel: self.name.clone(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

/// Internal feed that writes every event to the log
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            event_type = %event.event_type,
            recipient = %event.recipient_ref,
            title = %event.title,
            "{}",
            event.message
        );
        Ok(())
    }
}
