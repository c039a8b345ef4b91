use async_trait::async_trait;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// An email ready to be sent, with plain text and HTML bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// The password recovery email pointing at `recover_url`.
pub fn recovery_mail(to: &str, recover_url: &str) -> OutgoingMail {
    let text = format!(
        "Hello,\n\n\
         To reset your password, open or copy the following link:\n\n\
         {recover_url}\n\n\
         If you did not request this, ignore this message."
    );
    let html = format!(
        r#"<html><body>
  <p>Hello,</p>
  <p>To reset your password, press this button:</p>
  <p><a href="{recover_url}"
        style="display:inline-block;padding:10px 15px;background-color:#007bff;color:#ffffff;text-decoration:none;border-radius:4px;">
      Reset password
  </a></p>
  <p>If you did not request this, ignore this message.</p>
</body></html>"#
    );

    OutgoingMail {
        to: to.to_string(),
        subject: "Password recovery".to_string(),
        text,
        html,
    }
}

/// Sends through an SMTP relay using STARTTLS and credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(mail.to.parse()?)
            .subject(mail.subject)
            .multipart(MultiPart::alternative_plain_html(mail.text, mail.html))?;

        self.transport.send(message).await?;
        tracing::info!(to = %mail.to, "Sent email");
        Ok(())
    }
}

/// Development fallback when no SMTP relay is configured: the message is
/// written to the log instead of being delivered.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.text, "Email not sent (no SMTP relay)");
        Ok(())
    }
}
