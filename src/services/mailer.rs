/**
 * Mail Service
 * Outbound notifications over SMTP, or to the log when no relay is configured
 */
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::Mutex;

use crate::config::{MailConfig, SmtpConfig};
use crate::db::models::{Contact, User};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
    fn backend(&self) -> &'static str;
}

fn mail_error(e: impl std::fmt::Display) -> AppError {
    AppError::ExternalService(format!("mail delivery failed: {}", e))
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, from_name: &str, from_email: &str) -> Result<Self> {
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(mail_error)?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
            .build();

        let from = Mailbox::new(
            Some(from_name.to_string()),
            from_email.parse().map_err(mail_error)?,
        );

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse::<Mailbox>().map_err(mail_error)?)
            .subject(email.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(mail_error)?;

        self.transport.send(message).await.map_err(mail_error)?;
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "smtp"
    }
}

/// Logs each message instead of delivering it and keeps a copy.
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<Email>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "email (not delivered, no SMTP relay)");
        self.sent.lock().await.push(email);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "log"
    }
}

/// SMTP when a relay is configured, otherwise the log mailer.
pub fn from_config(config: &MailConfig) -> Result<std::sync::Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => Ok(std::sync::Arc::new(SmtpMailer::new(
            smtp,
            &config.from_name,
            &config.from_email,
        )?)),
        None => Ok(std::sync::Arc::new(LogMailer::new())),
    }
}

// ============================================================================
// Templates
// ============================================================================

pub fn welcome_email(user: &User) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Welcome to My Portfolio!".to_string(),
        html: format!(
            "<h2>Welcome {}!</h2>\
             <p>Thank you for joining my portfolio community. You now have access to exclusive content and updates.</p>\
             <p>Best regards,<br>Your Portfolio Team</p>",
            user.name
        ),
        text: format!(
            "Welcome {}!\n\nThank you for joining my portfolio community.\n\nBest regards,\nYour Portfolio Team",
            user.name
        ),
    }
}

pub fn contact_notification(contact: &Contact, admin_email: &str) -> Email {
    Email {
        to: admin_email.to_string(),
        subject: format!("New Contact Form Submission: {}", contact.subject),
        html: format!(
            "<h2>New Contact Form Submission</h2>\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Subject:</strong> {}</p>\
             <p><strong>Message:</strong></p>\
             <p>{}</p>\
             <p><strong>Submitted at:</strong> {}</p>",
            contact.name,
            contact.email,
            contact.subject,
            contact.message,
            contact.created_at.to_rfc2822()
        ),
        text: format!(
            "New contact form submission\n\nName: {}\nEmail: {}\nSubject: {}\n\n{}",
            contact.name, contact.email, contact.subject, contact.message
        ),
    }
}

pub fn contact_confirmation(contact: &Contact) -> Email {
    Email {
        to: contact.email.clone(),
        subject: "Thank you for contacting us!".to_string(),
        html: format!(
            "<h2>Thank you for reaching out!</h2>\
             <p>Hi {},</p>\
             <p>Thank you for your message. I have received your inquiry about \"{}\" and will get back to you as soon as possible.</p>\
             <p>Best regards,<br>Your Portfolio Team</p>",
            contact.name, contact.subject
        ),
        text: format!(
            "Hi {},\n\nThank you for your message about \"{}\". I will get back to you as soon as possible.\n\nBest regards,\nYour Portfolio Team",
            contact.name, contact.subject
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{new_object_id, ContactStatus};
    use chrono::Utc;

    fn contact() -> Contact {
        let now = Utc::now();
        Contact {
            id: new_object_id(),
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            subject: "Project inquiry".into(),
            message: "I would like to talk about a project.".into(),
            status: ContactStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_contact_templates() {
        let c = contact();
        let notification = contact_notification(&c, "admin@portfolio.com");
        assert_eq!(notification.to, "admin@portfolio.com");
        assert_eq!(notification.subject, "New Contact Form Submission: Project inquiry");
        assert!(notification.html.contains("jane@example.com"));

        let confirmation = contact_confirmation(&c);
        assert_eq!(confirmation.to, "jane@example.com");
        assert!(confirmation.html.contains("Project inquiry"));
    }

    #[tokio::test]
    async fn test_log_mailer_records() {
        let mailer = LogMailer::new();
        mailer.send(contact_confirmation(&contact())).await.unwrap();
        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Thank you for contacting us!");
    }

    #[tokio::test]
    async fn test_smtp_mailer_rejects_bad_sender() {
        let smtp = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            user: "u".into(),
            pass: "p".into(),
        };
        assert!(SmtpMailer::new(&smtp, "Portfolio", "not-an-address").is_err());
        assert!(SmtpMailer::new(&smtp, "Portfolio", "noreply@example.com").is_ok());
    }
}
