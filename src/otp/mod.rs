//! One-time passcode issuance and verification.
//!
//! A user holds at most one live code at a time: issuing a new code removes
//! every earlier one. A code is consumed by the first successful verification.

use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::api::metrics;
use crate::api::validation::{
    normalize_email, require_valid_email, require_valid_email_and_code, validate_name,
};
use crate::db::{format_timestamp, DbPool, OtpCode, OtpPurpose, User};
use crate::error::{Error, Result};
use crate::notifications::Notifier;

pub struct OtpService {
    db: DbPool,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(db: DbPool, notifier: Arc<dyn Notifier>, ttl_minutes: i64) -> Self {
        Self {
            db,
            notifier,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue a fresh code for `email` and send it.
    ///
    /// Login codes require an existing account; signup codes require that no
    /// account exists and take the display name from `signup_name`. If the
    /// email cannot be delivered the stored code remains valid and
    /// [`Error::Notification`] is returned.
    pub async fn request_code(
        &self,
        email: &str,
        purpose: OtpPurpose,
        signup_name: Option<&str>,
    ) -> Result<()> {
        let email = normalize_email(email);
        require_valid_email(&email)?;

        let display_name = match purpose {
            OtpPurpose::Login => match User::find_by_email(&self.db, &email).await? {
                Some(user) => user.name,
                None => return Err(Error::NotFound("User".to_string())),
            },
            OtpPurpose::Signup => {
                let name = signup_name.unwrap_or_default();
                validate_name(name).map_err(|msg| Error::invalid_field("name", msg))?;
                if User::exists(&self.db, &email).await? {
                    return Err(Error::Conflict(
                        "An account with this email already exists".to_string(),
                    ));
                }
                name.trim().to_string()
            }
        };

        let code = generate_code();
        let expiry_time = format_timestamp(chrono::Utc::now() + self.ttl);

        let mut tx = self.db.begin().await?;
        OtpCode::replace_for_email(&mut tx, &email, &code, purpose, &expiry_time).await?;
        tx.commit().await?;

        metrics::record_otp_issued(purpose);
        info!(email = %email, purpose = %purpose, "Issued one-time passcode");

        if let Err(e) = self
            .notifier
            .send_otp_email(&email, &code, &display_name)
            .await
        {
            error!(email = %email, error = %e, "Failed to deliver one-time passcode");
            return Err(Error::Notification(e.to_string()));
        }

        Ok(())
    }

    /// Consume `code` if it is live for `email` and `purpose`.
    ///
    /// A wrong, expired or already used code yields [`Error::InvalidOrExpired`]
    /// and leaves stored codes untouched.
    pub async fn verify_code(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        let email = normalize_email(email);
        let code = code.trim();
        require_valid_email_and_code(&email, code)?;

        let Some(row) = OtpCode::find_active(&self.db, &email, code, purpose).await? else {
            debug!(email = %email, purpose = %purpose, "Passcode rejected");
            return Err(Error::InvalidOrExpired);
        };

        // Only the verifier that actually deletes the row wins
        if OtpCode::delete_by_id(&self.db, row.id).await? != 1 {
            return Err(Error::InvalidOrExpired);
        }

        info!(email = %email, purpose = %purpose, "Passcode verified");
        Ok(())
    }

    /// Delete every expired code, returning how many were removed
    pub async fn sweep_expired(&self) -> Result<u64> {
        Ok(OtpCode::delete_expired(&self.db).await?)
    }
}

/// Six uniformly random decimal digits; leading zeros are kept
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, Role};
    use crate::notifications::testing::RecordingNotifier;

    async fn setup() -> (DbPool, Arc<RecordingNotifier>, OtpService) {
        let pool = test_pool().await;
        User::create(&pool, "ada@example.com", "Ada", "hash", Role::User)
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = OtpService::new(pool.clone(), notifier.clone(), 10);
        (pool, notifier, service)
    }

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_round_trip_succeeds_once() {
        let (_pool, notifier, service) = setup().await;
        service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await
            .unwrap();
        let code = notifier.last_code_for("ada@example.com").unwrap();

        service
            .verify_code("ada@example.com", &code, OtpPurpose::Login)
            .await
            .unwrap();

        let reuse = service
            .verify_code("ada@example.com", &code, OtpPurpose::Login)
            .await;
        assert!(matches!(reuse, Err(Error::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_new_code_replaces_old() {
        let (pool, notifier, service) = setup().await;
        service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await
            .unwrap();
        let first = notifier.last_code_for("ada@example.com").unwrap();
        service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await
            .unwrap();
        let second = notifier.last_code_for("ada@example.com").unwrap();

        assert_eq!(OtpCode::count_for_email(&pool, "ada@example.com").await.unwrap(), 1);
        if first != second {
            let stale = service
                .verify_code("ada@example.com", &first, OtpPurpose::Login)
                .await;
            assert!(matches!(stale, Err(Error::InvalidOrExpired)));
        }
        assert!(service
            .verify_code("ada@example.com", &second, OtpPurpose::Login)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_swept() {
        let (pool, notifier, service) = setup().await;
        service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await
            .unwrap();
        let code = notifier.last_code_for("ada@example.com").unwrap();

        let past = format_timestamp(chrono::Utc::now() - Duration::minutes(1));
        sqlx::query("UPDATE otp_codes SET expiry_time = ? WHERE email = ?")
            .bind(&past)
            .bind("ada@example.com")
            .execute(&pool)
            .await
            .unwrap();

        let result = service
            .verify_code("ada@example.com", &code, OtpPurpose::Login)
            .await;
        assert!(matches!(result, Err(Error::InvalidOrExpired)));

        assert_eq!(service.sweep_expired().await.unwrap(), 1);
        assert_eq!(service.sweep_expired().await.unwrap(), 0);
        assert_eq!(OtpCode::count_for_email(&pool, "ada@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_email_creates_nothing() {
        let (pool, notifier, service) = setup().await;
        let result = service
            .request_code("ghost@example.com", OtpPurpose::Login, None)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(OtpCode::count_for_email(&pool, "ghost@example.com").await.unwrap(), 0);
        assert!(notifier.last_code_for("ghost@example.com").is_none());
    }

    #[tokio::test]
    async fn test_signup_code_for_existing_account_conflicts() {
        let (_pool, _notifier, service) = setup().await;
        let result = service
            .request_code("ada@example.com", OtpPurpose::Signup, Some("Ada"))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_signup_requires_name() {
        let (_pool, _notifier, service) = setup().await;
        let result = service
            .request_code("new@example.com", OtpPurpose::Signup, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_purposes_are_not_interchangeable() {
        let (_pool, notifier, service) = setup().await;
        service
            .request_code("bob@example.com", OtpPurpose::Signup, Some("Bob"))
            .await
            .unwrap();
        let code = notifier.last_code_for("bob@example.com").unwrap();

        let as_login = service
            .verify_code("bob@example.com", &code, OtpPurpose::Login)
            .await;
        assert!(matches!(as_login, Err(Error::InvalidOrExpired)));
        assert!(service
            .verify_code("bob@example.com", &code, OtpPurpose::Signup)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_code_valid() {
        let pool = test_pool().await;
        User::create(&pool, "ada@example.com", "Ada", "hash", Role::User)
            .await
            .unwrap();
        let service = OtpService::new(pool.clone(), Arc::new(RecordingNotifier::failing()), 10);

        let result = service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await;
        assert!(matches!(result, Err(Error::Notification(_))));
        assert_eq!(OtpCode::count_for_email(&pool, "ada@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_mail_setup_is_reported() {
        let pool = test_pool().await;
        User::create(&pool, "ada@example.com", "Ada", "hash", Role::User)
            .await
            .unwrap();
        let notifier = crate::notifications::from_config(&crate::config::Config::default());
        let service = OtpService::new(pool.clone(), notifier, 10);

        let result = service
            .request_code("ada@example.com", OtpPurpose::Login, None)
            .await;
        assert!(matches!(result, Err(Error::Notification(_))));
    }

    #[tokio::test]
    async fn test_malformed_code_is_validation_error() {
        let (_pool, _notifier, service) = setup().await;
        let result = service
            .verify_code("ada@example.com", "12ab", OtpPurpose::Login)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
