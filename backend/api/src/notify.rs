//! Outbound email and in-app notifications.
//!
//! Both are side effects of a primary operation. Apart from registration,
//! where the OTP mail is part of the contract, a delivery failure is logged
//! and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdfund_protocol::NotificationKind;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, SmtpConfig};
use crate::db::notifications::{self, LinkedDocument, Notification};
use crate::errors::{ApiError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: &str, subject: &str, body: impl Into<String>) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.into(),
        }
    }

    pub fn otp(to: &str, name: &str, otp: &str) -> Self {
        Self::new(
            to,
            "Email Verification OTP - Crowdfunding Platform",
            format!(
                "Hello {name},\n\nYour verification code is {otp}. It expires in 10 minutes.\n"
            ),
        )
    }

    pub fn password_reset(to: &str, name: &str, token: &str) -> Self {
        Self::new(
            to,
            "Password Reset Request - Crowdfunding Platform",
            format!(
                "Hello {name},\n\nUse this token to reset your password: {token}\n\
                 It expires in 1 hour. Ignore this message if you did not ask for a reset.\n"
            ),
        )
    }

    pub fn admin_credentials(to: &str, name: &str, password: &str, role: &str) -> Self {
        Self::new(
            to,
            "Admin Account Created",
            format!(
                "Hello {name},\n\nYour admin account has been created.\n\
                 Email: {to}\nPassword: {password}\nRole: {role}\n\n\
                 Please change your password after your first login.\n"
            ),
        )
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Writes mails to the log instead of delivering them. With `show_body`
/// the body (OTPs, reset tokens) is logged at debug level; development only.
#[derive(Debug, Default, Clone)]
pub struct LogMailer {
    pub show_body: bool,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Outbound email");
        if self.show_body {
            debug!(to = %email.to, body = %email.body, "Outbound email body");
        }
        Ok(())
    }
}

/// Delivers through an SMTP relay with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| ApiError::Config(format!("Invalid MAIL_FROM: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ApiError::Config(format!("Invalid SMTP_HOST: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { transport, from })
    }

    fn message(&self, email: &Email) -> Result<Message> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| ApiError::BadRequest(format!("Invalid recipient address: {e}")))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .body(email.body.clone())
            .map_err(|e| ApiError::Internal(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let message = self.message(email)?;
        self.transport.send(message).await.map_err(|e| {
            warn!(to = %email.to, "SMTP delivery failed: {e}");
            ApiError::Upstream("Failed to send email".to_string())
        })?;
        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// SMTP when configured, otherwise the log.
pub fn mailer_for(config: &Config) -> Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp)?)),
        None => {
            warn!("SMTP_HOST is not set; outbound mail is only logged");
            Ok(Arc::new(LogMailer {
                show_body: config.is_development(),
            }))
        }
    }
}

/// Send without failing the caller.
pub async fn send_quietly(mailer: &dyn Mailer, email: Email) {
    if let Err(e) = mailer.send(&email).await {
        warn!(to = %email.to, subject = %email.subject, "Email dispatch failed: {e}");
    }
}

// ─────────────────────────────────────────────────────────
// In-app notifications
// ─────────────────────────────────────────────────────────

pub fn notification(
    user_id: &str,
    kind: NotificationKind,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind,
        message: message.into(),
        recipient: None,
        campaign_id: None,
        document: None,
        read: false,
        created_at: now,
    }
}

impl Notification {
    pub fn for_campaign(mut self, campaign_id: &str) -> Self {
        self.campaign_id = Some(campaign_id.to_string());
        self
    }

    pub fn labelled(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_document(mut self, title: &str, file_url: &str) -> Self {
        self.document = Some(LinkedDocument {
            title: title.to_string(),
            file_url: file_url.to_string(),
        });
        self
    }
}

/// Store a batch of notifications, logging instead of failing.
pub async fn deliver(pool: &SqlitePool, batch: Vec<Notification>) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    match notifications::insert_many(pool, &batch).await {
        Ok(()) => info!(count, "Notifications stored"),
        Err(e) => warn!(count, "Failed to store notifications: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_builder_fills_links() {
        let n = notification("u-1", NotificationKind::VotingDocument, "vote", Utc::now())
            .for_campaign("c-1")
            .with_document("Invoice", "/uploads/proofs/proof-1-abc.pdf");
        assert_eq!(n.campaign_id.as_deref(), Some("c-1"));
        assert_eq!(n.document.as_ref().map(|d| d.title.as_str()), Some("Invoice"));
        assert!(!n.read);
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer { show_body: true }
            .send(&Email::otp("a@example.com", "Asha", "123456"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn smtp_message_carries_headers() {
        let mailer = SmtpMailer::new(&SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "mailer".into(),
            password: "secret".into(),
            from: "Crowdfunding <no-reply@example.com>".into(),
        })
        .unwrap();
        let message = mailer
            .message(&Email::otp("asha@example.com", "Asha", "123456"))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: asha@example.com"));
        assert!(raw.contains("Subject: Email Verification OTP"));

        assert!(mailer
            .message(&Email::otp("not an address", "Asha", "123456"))
            .is_err());
    }
}
