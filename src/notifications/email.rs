//! SMTP delivery of verification and welcome emails.
//!
//! Uses the SMTP settings from the `[email]` section of the config file.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::Notifier;
use crate::config::EmailConfig;

pub const OTP_SUBJECT: &str = "ART&BAY - Your verification code";
pub const WELCOME_SUBJECT: &str = "Welcome to ART&BAY";

/// Sends storefront emails through an SMTP relay
pub struct SmtpNotifier {
    config: EmailConfig,
    otp_ttl_minutes: i64,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig, otp_ttl_minutes: i64) -> Self {
        Self {
            config,
            otp_ttl_minutes,
        }
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_otp_email(&self, to: &str, code: &str, name: &str) -> Result<()> {
        let html = render_otp_html(name, code, self.otp_ttl_minutes);
        let text = render_otp_text(name, code, self.otp_ttl_minutes);
        self.send_email(to, OTP_SUBJECT, &html, &text).await
    }

    async fn send_welcome_email(&self, to: &str, name: &str) -> Result<()> {
        let html = render_welcome_html(name);
        let text = render_welcome_text(name);
        self.send_email(to, WELCOME_SUBJECT, &html, &text).await
    }
}

const EMAIL_STYLE: &str = r#"
        body {
            font-family: Georgia, 'Times New Roman', serif;
            margin: 0;
            padding: 0;
            background-color: #f7f3ee;
        }
        .container {
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }
        .card {
            background-color: #ffffff;
            border-radius: 8px;
            overflow: hidden;
        }
        .header {
            background-color: #1f1b16;
            color: #f7f3ee;
            padding: 28px 24px;
            text-align: center;
            letter-spacing: 2px;
        }
        .content {
            padding: 32px 24px;
            color: #374151;
            line-height: 1.6;
        }
        .code {
            font-family: 'Courier New', monospace;
            font-size: 32px;
            letter-spacing: 8px;
            text-align: center;
            background-color: #f3f4f6;
            border-radius: 6px;
            padding: 16px;
            margin: 24px 0;
        }
        .note {
            color: #6b7280;
            font-size: 13px;
        }
"#;

fn render_otp_html(name: &str, code: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Your verification code</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header"><h1>ART&amp;BAY</h1></div>
            <div class="content">
                <p>Hello {name},</p>
                <p>Use this code to continue:</p>
                <div class="code">{code}</div>
                <p class="note">The code expires in {ttl_minutes} minutes. If you did not ask for it, you can ignore this email.</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        style = EMAIL_STYLE,
        name = html_escape(name),
        code = code,
        ttl_minutes = ttl_minutes,
    )
}

fn render_otp_text(name: &str, code: &str, ttl_minutes: i64) -> String {
    format!(
        "Hello {name},\n\nYour ART&BAY verification code is: {code}\n\nThe code expires in {ttl_minutes} minutes. If you did not ask for it, you can ignore this email.\n"
    )
}

fn render_welcome_html(name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Welcome to ART&amp;BAY</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header"><h1>ART&amp;BAY</h1></div>
            <div class="content">
                <p>Welcome, {name}!</p>
                <p>Your account is ready. Browse the gallery, collect the pieces you love, or open your own studio by upgrading to an artist account.</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        style = EMAIL_STYLE,
        name = html_escape(name),
    )
}

fn render_welcome_text(name: &str) -> String {
    format!(
        "Welcome, {name}!\n\nYour ART&BAY account is ready. Browse the gallery, collect the pieces you love, or open your own studio by upgrading to an artist account.\n"
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
