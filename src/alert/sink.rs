//! # Notification Sinks
//!
//! The outbound channel for alerts. The dispatcher only knows the
//! [`NotificationSink`] trait; concrete channels live next to it:
//!
//! - [`LogSink`]: writes alerts to the application log (default)
//! - [`WebhookSink`](super::webhook::WebhookSink): HTTP POST of a JSON payload
//! - [`EmailSink`](super::email::EmailSink): SMTP e-mail

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::email::EmailSink;
use super::webhook::WebhookSink;
use crate::config::{NotifierConfig, NotifierKind};
use crate::error::Result;

/// Rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// External channel that alerts are delivered to.
///
/// Implementations report failure through `Err`; retrying, timeouts and
/// de-duplication are handled by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: &AlertMessage) -> Result<()>;
}

/// Sink that writes alerts to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        warn!(subject = %message.subject, "ALERT: {}", message.body);
        Ok(())
    }
}

/// Build the sink selected by configuration.
///
/// # Errors
///
/// Returns error if the selected channel cannot be constructed (e.g. an
/// unresolvable SMTP relay or a malformed sender address).
pub fn build_sink(config: &NotifierConfig) -> Result<Arc<dyn NotificationSink>> {
    let sink: Arc<dyn NotificationSink> = match config.kind {
        NotifierKind::Log => Arc::new(LogSink),
        NotifierKind::Webhook => Arc::new(WebhookSink::new(config.url.clone())),
        NotifierKind::Email => Arc::new(EmailSink::from_config(config)?),
    };
    Ok(sink)
}
