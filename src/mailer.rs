//! Outbound email: message kinds, delivery abstraction, and the background
//! queue worker.
//!
//! API handlers enqueue an [`EmailMessage`] on a bounded channel and move on;
//! a spawned worker drains the channel and hands each message to an
//! [`EmailSender`]. Delivery is best-effort: failures are logged and never
//! fail the API call that triggered them, and a full queue drops the message
//! with a warning instead of blocking the request path.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs and
//! returns `Ok(())`. Production uses [`SmtpSender`] over STARTTLS; certificate
//! verification can only be relaxed through an explicit development flag.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The four message kinds the service sends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailMessage {
    EmailVerification { to: String, code: String },
    PasswordChangeOtp { to: String, code: String },
    PasswordResetOtp { to: String, code: String },
    TemporaryPassword { to: String, value: String },
}

impl EmailMessage {
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::EmailVerification { to, .. }
            | Self::PasswordChangeOtp { to, .. }
            | Self::PasswordResetOtp { to, .. }
            | Self::TemporaryPassword { to, .. } => to,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmailVerification { .. } => "email_verification",
            Self::PasswordChangeOtp { .. } => "password_change_otp",
            Self::PasswordResetOtp { .. } => "password_reset_otp",
            Self::TemporaryPassword { .. } => "temporary_password",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            Self::EmailVerification { .. } => "Your Verification Code",
            Self::PasswordChangeOtp { .. } => "Your Password Change Code",
            Self::PasswordResetOtp { .. } => "Your Password Reset Code",
            Self::TemporaryPassword { .. } => "Your Temporary Password",
        }
    }

    fn body_html(&self) -> String {
        match self {
            Self::EmailVerification { code, .. }
            | Self::PasswordChangeOtp { code, .. }
            | Self::PasswordResetOtp { code, .. } => format!(
                r#"<div style="font-family: Arial, sans-serif; padding: 20px;">
    <h2>Hello!</h2>
    <p>Your verification code is:</p>
    <h1 style="color: #2d89ef; letter-spacing: 5px;">{code}</h1>
    <p>This code will expire in 5 minutes.</p>
    <p>If you did not request this, please ignore this email.</p>
</div>"#
            ),
            Self::TemporaryPassword { value, .. } => format!(
                r#"<div style="font-family: Arial, sans-serif; padding: 20px;">
    <h2>Hello!</h2>
    <p>Your temporary password is:</p>
    <h1 style="color: #2d89ef; letter-spacing: 5px;">{value}</h1>
    <p>Please log in and change it as soon as possible.</p>
</div>"#
            ),
        }
    }
}

/// Email delivery abstraction used by the queue worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to have it logged as failed.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.recipient(),
            kind = message.kind(),
            "email send stub"
        );
        Ok(())
    }
}

/// SMTP transport configuration.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub sender_name: String,
    /// Development-only escape hatch for self-signed SMTP certificates.
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("sender_name", &self.sender_name)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Delivers messages over SMTP with STARTTLS.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    /// Build the transport and sender mailbox from configuration.
    ///
    /// # Errors
    /// Returns an error if the TLS parameters or the sender mailbox are
    /// invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut tls = TlsParameters::builder(config.host.clone());
        if config.accept_invalid_certs {
            warn!("SMTP certificate verification is disabled");
            tls = tls.dangerous_accept_invalid_certs(true);
        }
        let tls = tls.build().context("failed to build SMTP TLS parameters")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(Tls::Required(tls))
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from = format!("{} <{}>", config.sender_name, config.username)
            .parse()
            .context("invalid SMTP sender mailbox")?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(message
                .recipient()
                .parse()
                .context("invalid recipient address")?)
            .subject(message.subject())
            .header(ContentType::TEXT_HTML)
            .body(message.body_html())
            .context("failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Cheap handle API handlers use to enqueue outbound mail.
#[derive(Clone, Debug)]
pub struct MailerHandle {
    tx: mpsc::Sender<EmailMessage>,
}

impl MailerHandle {
    /// Enqueue a message without blocking. A full queue drops the message.
    pub fn enqueue(&self, message: EmailMessage) {
        if self.tx.try_send(message).is_err() {
            warn!("mail queue full, dropping outbound email");
        }
    }
}

/// Build the bounded queue without spawning a worker. Used by tests to
/// observe what the engine enqueues.
#[must_use]
pub fn queue(capacity: usize) -> (MailerHandle, mpsc::Receiver<EmailMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailerHandle { tx }, rx)
}

/// Spawn the background worker that drains the queue into the sender.
pub fn spawn_mailer(
    sender: Arc<dyn EmailSender>,
    capacity: usize,
) -> (MailerHandle, tokio::task::JoinHandle<()>) {
    let (handle, mut rx) = queue(capacity);
    let worker = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = sender.send(&message).await {
                error!(
                    kind = message.kind(),
                    to = %message.recipient(),
                    "email delivery failed: {err:#}"
                );
            }
        }
    });
    (handle, worker)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct RecordingSender {
        seen: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.seen.lock().await.push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn message_accessors() {
        let message = EmailMessage::EmailVerification {
            to: "ada@x.test".to_string(),
            code: "123456".to_string(),
        };
        assert_eq!(message.recipient(), "ada@x.test");
        assert_eq!(message.kind(), "email_verification");
        assert!(message.body_html().contains("123456"));
    }

    #[test]
    fn temporary_password_body_carries_the_value() {
        let message = EmailMessage::TemporaryPassword {
            to: "ada@x.test".to_string(),
            value: "s3cretAB".to_string(),
        };
        assert_eq!(message.subject(), "Your Temporary Password");
        assert!(message.body_html().contains("s3cretAB"));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (handle, mut rx) = queue(1);
        for i in 0..3 {
            handle.enqueue(EmailMessage::PasswordResetOtp {
                to: format!("user{i}@x.test"),
                code: "000000".to_string(),
            });
        }
        let first = rx.recv().await.unwrap();
        assert_eq!(first.recipient(), "user0@x.test");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn worker_hands_messages_to_the_sender() {
        let sender = Arc::new(RecordingSender {
            seen: Mutex::new(Vec::new()),
        });
        let (handle, worker) = spawn_mailer(sender.clone(), 8);

        handle.enqueue(EmailMessage::PasswordChangeOtp {
            to: "ada@x.test".to_string(),
            code: "424242".to_string(),
        });
        drop(handle);
        worker.await.unwrap();

        let seen = sender.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind(), "password_change_otp");
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let message = EmailMessage::EmailVerification {
            to: "ada@x.test".to_string(),
            code: "123456".to_string(),
        };
        assert!(sender.send(&message).await.is_ok());
    }
}
