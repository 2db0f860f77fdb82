use std::sync::Arc;

use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error(transparent)]
    Address(#[from] lettre::address::AddressError),
    #[error(transparent)]
    Message(#[from] lettre::error::Error),
    #[error(transparent)]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("mail: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub fn verification_email(to: &str, username: &str, code: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Email Verification".into(),
        body: format!(
            "Hello {username},\n\n\
            Thank you for registering. Please verify your email address by entering \
            the following verification code in the app:\n\n\
            Verification Code: {code}\n\n\
            If you did not request this, please ignore this email.\n"
        ),
    }
}

pub fn password_reset_email(to: &str, reset_url: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Password Reset".into(),
        body: format!(
            "You are receiving this email because a password reset request was made for your account.\n\n\
            Please click on the following link, or paste it into your browser, to complete the process within one hour:\n\n\
            {reset_url}\n\n\
            If you did not request this, please ignore this email and your password will remain unchanged.\n"
        ),
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, username: String, password: String, from: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Writes mail to the log. Used when no SMTP relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail not sent, no SMTP relay configured\n{}", email.body);
        Ok(())
    }
}

pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>, MailError> {
    match (&config.smtp_host, &config.smtp_username, &config.smtp_password) {
        (Some(host), Some(username), Some(password)) => {
            let from = config.mail_from.as_deref().unwrap_or(username.as_str());
            tracing::info!("sending mail through {host}");
            Ok(Arc::new(SmtpMailer::new(host, username.clone(), password.clone(), from)?))
        }
        _ => {
            tracing::warn!("SMTP is not configured, mail will be logged instead");
            Ok(Arc::new(LogMailer))
        }
    }
}
