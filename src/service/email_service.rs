//! Email Service
//!
//! Outbound mail through SMTP with embedded tera templates: the sign-up
//! confirmation and the password reset link.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use lettre::{
    message::{header, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::{error, info, warn};
use tera::{Context, Tera};
use thiserror::Error;
use uuid::Uuid;

use crate::config::EmailConfig;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),

    #[error("Mail delivery is not configured")]
    NotConfigured,
}

/// Outbound account mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation(&self, email: &str) -> Result<(), MailError>;

    /// Mails `{domain}/reset/{account_id}/{raw_token}` to `email`
    async fn send_reset_link(
        &self,
        email: &str,
        domain: &str,
        account_id: Uuid,
        raw_token: &str,
    ) -> Result<(), MailError>;
}

/// Builds the link the reset mail points to
pub fn reset_link(domain: &str, account_id: Uuid, raw_token: &str) -> String {
    format!(
        "{}/reset/{}/{}",
        domain.trim_end_matches('/'),
        account_id,
        raw_token
    )
}

const CONFIRMATION_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Welcome to {{ app_name }}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1>Welcome to {{ app_name }}!</h1>
    <p>Your account for <strong>{{ email }}</strong> is ready.</p>
    <p>Best regards,<br>The {{ app_name }} Team</p>
    <p style="font-size: 12px; color: #666;">© {{ current_year }} {{ app_name }}</p>
</body>
</html>
"#;

const CONFIRMATION_TEXT: &str = r#"
Welcome to {{ app_name }}!

Your account for {{ email }} is ready.

Best regards,
The {{ app_name }} Team
"#;

const RESET_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Reset your password</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1>Reset your password</h1>
    <p>We received a request to reset the password of your {{ app_name }} account.</p>
    <p><a href="{{ reset_link }}" style="display: inline-block; padding: 12px 24px; background: #007bff; color: white; text-decoration: none; border-radius: 4px;">Choose a new password</a></p>
    <p>This link expires in <strong>{{ expires_in_hours }} hours</strong>. If you did not ask for a reset, you can ignore this email.</p>
    <p style="font-size: 12px; color: #666;">© {{ current_year }} {{ app_name }}</p>
</body>
</html>
"#;

const RESET_TEXT: &str = r#"
Reset your password

We received a request to reset the password of your {{ app_name }} account.
Open the link below to choose a new password:

{{ reset_link }}

This link expires in {{ expires_in_hours }} hours. If you did not ask for a reset, you can ignore this email.
"#;

/// SMTP implementation of [`Mailer`]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: Tera,
    config: EmailConfig,
    reset_ttl_hours: i64,
}

impl EmailService {
    pub fn new(config: EmailConfig, reset_ttl_hours: i64) -> Result<Self, MailError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(format!("Failed to configure SMTP relay: {}", e)))?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)))
            .build();

        Ok(Self {
            transport,
            templates: Self::embedded_templates()?,
            config,
            reset_ttl_hours,
        })
    }

    fn embedded_templates() -> Result<Tera, MailError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("confirmation_email.html", CONFIRMATION_HTML),
            ("confirmation_email.txt", CONFIRMATION_TEXT),
            ("reset_email.html", RESET_HTML),
            ("reset_email.txt", RESET_TEXT),
        ])
        .map_err(|e| MailError::Template(e.to_string()))?;
        Ok(tera)
    }

    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("app_name", &self.config.from_name);
        context.insert("current_year", &chrono::Utc::now().year());
        context
    }

    /// Renders the `(text, html)` bodies of template pair `name`
    fn render(&self, name: &str, context: &Context) -> Result<(String, String), MailError> {
        let text = self
            .templates
            .render(&format!("{}.txt", name), context)
            .map_err(|e| MailError::Template(e.to_string()))?;
        let html = self
            .templates
            .render(&format!("{}.html", name), context)
            .map_err(|e| MailError::Template(e.to_string()))?;
        Ok((text, html))
    }

    async fn deliver(
        &self,
        to_email: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| MailError::Address(format!("Invalid from address: {}", e)))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| MailError::Address(format!("Invalid recipient email: {}", e)))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| MailError::Build(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email '{}' sent to: {}", subject, to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email '{}' to {}: {}", subject, to_email, e);
                Err(MailError::Transport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_confirmation(&self, email: &str) -> Result<(), MailError> {
        let mut context = self.base_context();
        context.insert("email", email);

        let (text, html) = self.render("confirmation_email", &context)?;
        let subject = format!("Welcome to {}", self.config.from_name);
        self.deliver(email, &subject, text, html).await
    }

    async fn send_reset_link(
        &self,
        email: &str,
        domain: &str,
        account_id: Uuid,
        raw_token: &str,
    ) -> Result<(), MailError> {
        let mut context = self.base_context();
        context.insert("reset_link", &reset_link(domain, account_id, raw_token));
        context.insert("expires_in_hours", &self.reset_ttl_hours);

        let (text, html) = self.render("reset_email", &context)?;
        self.deliver(email, "Reset your password", text, html).await
    }
}

/// Mailer used when no SMTP relay is configured
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_confirmation(&self, email: &str) -> Result<(), MailError> {
        warn!("Mail disabled; confirmation for {} not sent", email);
        Err(MailError::NotConfigured)
    }

    async fn send_reset_link(
        &self,
        email: &str,
        _domain: &str,
        _account_id: Uuid,
        _raw_token: &str,
    ) -> Result<(), MailError> {
        warn!("Mail disabled; reset link for {} not sent", email);
        Err(MailError::NotConfigured)
    }
}
