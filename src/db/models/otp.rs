//! One-time passcode rows.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::db::now_timestamp;

/// What a passcode was issued for; a login code cannot complete a signup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Login,
    Signup,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Signup => "signup",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OtpCode {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub otp: String,
    pub purpose: String,
    pub expiry_time: String,
    pub created_at: String,
}

impl OtpCode {
    /// Drop every earlier code for `email` and store `code` in its place
    pub async fn replace_for_email(
        conn: &mut SqliteConnection,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        expiry_time: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query("DELETE FROM otp_codes WHERE email = ?")
            .bind(email)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO otp_codes (email, otp, purpose, expiry_time, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(purpose.as_str())
        .bind(expiry_time)
        .bind(now_timestamp())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Unexpired code matching all three keys
    pub async fn find_active(
        db: &SqlitePool,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpCode>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, email, otp, purpose, expiry_time, created_at
            FROM otp_codes
            WHERE email = ? AND otp = ? AND purpose = ? AND expiry_time > ?
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(purpose.as_str())
        .bind(now_timestamp())
        .fetch_optional(db)
        .await
    }

    pub async fn delete_by_id(db: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(db: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expiry_time <= ?")
            .bind(now_timestamp())
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_email(db: &SqlitePool, email: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM otp_codes WHERE email = ?")
            .bind(email)
            .fetch_one(db)
            .await
    }
}
