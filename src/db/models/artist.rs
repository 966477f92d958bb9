use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::db::now_timestamp;

/// Artist profile attached to a user account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Artist {
    pub email: String,
    pub bio: Option<String>,
    pub profile_pic: Option<String>,
    pub approved: bool,
    pub created_at: String,
}

impl Artist {
    /// Create the profile row; an existing profile is left as it is
    pub async fn create_for(
        conn: &mut SqliteConnection,
        email: &str,
        approved: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO artists (email, approved, created_at) VALUES (?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(approved)
        .bind(now_timestamp())
        .execute(conn)
        .await?;
        Ok(())
    }
}
