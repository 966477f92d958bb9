//! Key/value site settings.

use sqlx::SqlitePool;

/// Controls whether new artists need admin approval (`manual`) or not
pub const ARTIST_APPROVAL_KEY: &str = "artist_approval";

pub struct Setting;

impl Setting {
    pub async fn get(db: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT setting_value FROM settings WHERE setting_key = ?")
            .bind(key)
            .fetch_optional(db)
            .await
    }

    pub async fn set(db: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (setting_key, setting_value) VALUES (?, ?)
            ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(db)
        .await?;
        Ok(())
    }

    /// True unless artist approval is configured as `manual`
    pub async fn artists_auto_approved(db: &SqlitePool) -> Result<bool, sqlx::Error> {
        let value = Self::get(db, ARTIST_APPROVAL_KEY).await?;
        Ok(!matches!(value.as_deref(), Some("manual")))
    }
}
