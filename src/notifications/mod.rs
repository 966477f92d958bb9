//! Outbound customer notifications.
//!
//! The OTP flow and signup depend only on the [`Notifier`] trait. In
//! production it is backed by [`SmtpNotifier`]; without SMTP settings the
//! [`UnconfiguredNotifier`] refuses every message so callers report the
//! failure instead of claiming an email went out.

mod email;

pub use email::{SmtpNotifier, OTP_SUBJECT, WELCOME_SUBJECT};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a one-time passcode to `to`
    async fn send_otp_email(&self, to: &str, code: &str, name: &str) -> Result<()>;

    /// Greet a freshly registered user
    async fn send_welcome_email(&self, to: &str, name: &str) -> Result<()>;
}

/// Notifier used when email is not configured; every send fails
pub struct UnconfiguredNotifier;

#[async_trait]
impl Notifier for UnconfiguredNotifier {
    async fn send_otp_email(&self, to: &str, _code: &str, _name: &str) -> Result<()> {
        anyhow::bail!("SMTP is not configured, cannot send verification code to {}", to)
    }

    async fn send_welcome_email(&self, to: &str, _name: &str) -> Result<()> {
        anyhow::bail!("SMTP is not configured, cannot send welcome email to {}", to)
    }
}

/// Pick the notifier matching the email configuration
pub fn from_config(config: &Config) -> Arc<dyn Notifier> {
    if config.email.is_configured() {
        Arc::new(SmtpNotifier::new(
            config.email.clone(),
            config.otp.ttl_minutes,
        ))
    } else {
        tracing::warn!("SMTP is not configured; verification codes will not be delivered");
        Arc::new(UnconfiguredNotifier)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Notifier that records every message and can be told to fail
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub otps: Mutex<Vec<(String, String)>>,
        pub welcomes: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        /// Most recent code sent to `email`
        pub fn last_code_for(&self, email: &str) -> Option<String> {
            self.otps
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_otp_email(&self, to: &str, code: &str, _name: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp relay unavailable");
            }
            self.otps
                .lock()
                .unwrap()
                .push((to.to_string(), code.to_string()));
            Ok(())
        }

        async fn send_welcome_email(&self, to: &str, _name: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp relay unavailable");
            }
            self.welcomes.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }
}
