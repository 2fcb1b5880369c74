//! # E-mail Sink
//!
//! Sends alerts over SMTP with implicit TLS and login credentials.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::sink::{AlertMessage, NotificationSink};
use crate::config::NotifierConfig;
use crate::error::{MonitorError, Result};

pub struct EmailSink {
    sender: Mailbox,
    recipient: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for EmailSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSink")
            .field("sender", &self.sender.to_string())
            .field("recipient", &self.recipient.to_string())
            .finish_non_exhaustive()
    }
}

impl EmailSink {
    /// Build an SMTP sink from the `[notifier]` section.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if an address does not parse or the
    /// relay host is invalid.
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        let sender = parse_mailbox("sender", &config.sender)?;
        let recipient = parse_mailbox("recipient", &config.recipient)?;

        let credentials =
            Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
            .map_err(|e| {
                MonitorError::Config(format!("invalid SMTP server {}: {}", config.smtp_server, e))
            })?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            sender,
            recipient,
            transport,
        })
    }
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| MonitorError::Config(format!("invalid {} address {:?}: {}", field, address, e)))
}

#[async_trait]
impl NotificationSink for EmailSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| MonitorError::Notify(format!("failed to build e-mail: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MonitorError::Notify(format!("SMTP delivery failed: {}", e)))?;

        info!("E-mail notification sent to {}", self.recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifierKind;

    fn email_config() -> NotifierConfig {
        NotifierConfig {
            kind: NotifierKind::Email,
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 465,
            smtp_username: "monitor".to_string(),
            smtp_password: "secret".to_string(),
            sender: "monitor@example.com".to_string(),
            recipient: "pilot@example.com".to_string(),
            ..NotifierConfig::default()
        }
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let mut config = email_config();
        config.sender = "monitor-at-example".to_string();
        let err = EmailSink::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("sender"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let mut config = email_config();
        config.recipient = "not an address".to_string();
        let err = EmailSink::from_config(&config).unwrap_err();
        assert!(err.is_config());
    }
}
