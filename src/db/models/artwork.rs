//! Artwork listings. Only the read side and creation are needed by the
//! storefront core; editing and deletion belong to the artist dashboard.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};

use super::common::{format_money, parse_money};
use crate::db::now_timestamp;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Artwork {
    pub art_id: i64,
    pub email: String,
    pub title: String,
    pub description: Option<String>,
    pub price: String,
    pub category: Option<String>,
    pub image_path: Option<String>,
    pub created_at: String,
}

/// Fields needed to list a new artwork
#[derive(Debug, Clone)]
pub struct NewArtwork<'a> {
    pub artist_email: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub price: Decimal,
    pub category: Option<&'a str>,
    pub image_path: Option<&'a str>,
}

impl Artwork {
    pub fn price(&self) -> Result<Decimal> {
        parse_money(&self.price)
    }

    pub async fn find_by_id<'e, E: SqliteExecutor<'e>>(
        db: E,
        art_id: i64,
    ) -> Result<Option<Artwork>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT art_id, email, title, description, price, category, image_path, created_at
            FROM art
            WHERE art_id = ?
            "#,
        )
        .bind(art_id)
        .fetch_optional(db)
        .await
    }

    pub async fn create<'e, E: SqliteExecutor<'e>>(
        db: E,
        new: &NewArtwork<'_>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO art (email, title, description, price, category, image_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.artist_email)
        .bind(new.title)
        .bind(new.description)
        .bind(format_money(new.price))
        .bind(new.category)
        .bind(new.image_path)
        .bind(now_timestamp())
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
