//! # Webhook Sink
//!
//! Delivers alerts as a JSON `POST` (`{"subject": ..., "body": ...}`).
//! Any non-2xx response counts as a failed attempt.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::sink::{AlertMessage, NotificationSink};
use crate::error::{MonitorError, Result};

pub struct WebhookSink {
    url: String,
    client: Client,
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| MonitorError::Notify(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        response
            .error_for_status()
            .map_err(|e| MonitorError::Notify(format!("webhook rejected alert: {}", e)))?;

        debug!("Webhook {} accepted alert ({})", self.url, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_notify_error() {
        // Port 9 (discard) on localhost is closed on test machines
        let sink = WebhookSink::new("http://127.0.0.1:9/alerts");
        let err = sink.send(&AlertMessage::new("s", "b")).await.unwrap_err();
        assert!(matches!(err, MonitorError::Notify(_)));
    }

    #[test]
    fn test_debug_shows_url() {
        let sink = WebhookSink::new("http://example.invalid/hook");
        assert_eq!(sink.url(), "http://example.invalid/hook");
        assert!(format!("{:?}", sink).contains("example.invalid"));
    }
}
