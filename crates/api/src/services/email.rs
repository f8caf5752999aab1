//! Email sending abstraction.
//!
//! Uses Resend in production, SMTP (lettre) in development.
//! This allows local development without a Resend account.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
};
use resend_rs::types::CreateEmailBaseOptions;

const FROM: &str = "Hearth <noreply@mail.hearth.dev>";

fn verification_body(name: &str, link: &str) -> String {
    format!(
        "Hi {},\n\nConfirm your email address to activate your Hearth account:\n\n{}\n\n\
         This link expires in 24 hours. If you didn't create an account, you can ignore this email.",
        name, link
    )
}

fn reset_body(name: &str, link: &str) -> String {
    format!(
        "Hi {},\n\nWe received a request to reset your Hearth password:\n\n{}\n\n\
         This link expires in 1 hour. If you didn't request a reset, you can ignore this email.",
        name, link
    )
}

/// Outbound email service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the account verification link.
    async fn send_verification_email(&self, to: &str, name: &str, link: &str) -> Result<()>;

    /// Send the password reset link.
    async fn send_password_reset_email(&self, to: &str, name: &str, link: &str) -> Result<()>;
}

/// Concrete mailer, selected by configuration.
pub enum MailerImpl {
    /// SMTP-based sender using lettre (for development)
    Smtp(SmtpMailer),
    /// Resend API sender (for production)
    Resend(ResendMailer),
}

impl MailerImpl {
    /// Uses Resend if an API key is provided, otherwise falls back to SMTP.
    pub fn new(resend_api_key: Option<String>, smtp_url: Option<String>) -> Result<Self> {
        if let Some(api_key) = resend_api_key.filter(|k| !k.is_empty()) {
            Ok(Self::Resend(ResendMailer::new(api_key)))
        } else if let Some(url) = smtp_url.filter(|u| !u.is_empty()) {
            Ok(Self::Smtp(SmtpMailer::new(&url)?))
        } else {
            anyhow::bail!("Either RESEND_API_KEY or SMTP_URL must be configured")
        }
    }
}

#[async_trait]
impl Mailer for MailerImpl {
    async fn send_verification_email(&self, to: &str, name: &str, link: &str) -> Result<()> {
        let subject = "Verify your Hearth email address";
        let body = verification_body(name, link);
        match self {
            Self::Resend(sender) => sender.send(to, subject, &body).await,
            Self::Smtp(sender) => sender.send(to, subject, &body),
        }
    }

    async fn send_password_reset_email(&self, to: &str, name: &str, link: &str) -> Result<()> {
        let subject = "Reset your Hearth password";
        let body = reset_body(name, link);
        match self {
            Self::Resend(sender) => sender.send(to, subject, &body).await,
            Self::Smtp(sender) => sender.send(to, subject, &body),
        }
    }
}

/// SMTP sender using lettre.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(smtp_url: &str) -> Result<Self> {
        let transport = SmtpTransport::from_url(smtp_url)?.build();

        Ok(Self { transport })
    }

    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(FROM.parse::<Mailbox>()?)
            .to(Mailbox::new(None, to.parse()?))
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(&email)?;

        Ok(())
    }
}

/// Resend API sender.
pub struct ResendMailer {
    client: resend_rs::Resend,
}

impl ResendMailer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: resend_rs::Resend::new(&api_key),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = CreateEmailBaseOptions::new(FROM, [to], subject).with_text(body);

        self.client.emails.send(email).await?;

        Ok(())
    }
}
