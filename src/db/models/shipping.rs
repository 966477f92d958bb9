use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::db::now_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShippingInfo {
    pub shipping_id: i64,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub zipcode: String,
    pub country: String,
    pub created_at: String,
}

/// Validated address fields, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub zipcode: String,
    pub country: String,
}

impl From<ShippingInfo> for ShippingDetails {
    fn from(info: ShippingInfo) -> Self {
        Self {
            full_name: info.name,
            phone: info.phone,
            address: info.address,
            city: info.city,
            zipcode: info.zipcode,
            country: info.country,
        }
    }
}

impl ShippingInfo {
    pub async fn create(
        conn: &mut SqliteConnection,
        email: &str,
        details: &ShippingDetails,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO shipping_info (email, name, phone, address, city, zipcode, country, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(&details.full_name)
        .bind(&details.phone)
        .bind(&details.address)
        .bind(&details.city)
        .bind(&details.zipcode)
        .bind(&details.country)
        .bind(now_timestamp())
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Saved address, only if it belongs to `email`
    pub async fn find_for_user(
        db: &SqlitePool,
        shipping_id: i64,
        email: &str,
    ) -> Result<Option<ShippingInfo>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT shipping_id, email, name, phone, address, city, zipcode, country, created_at
            FROM shipping_info
            WHERE shipping_id = ? AND email = ?
            "#,
        )
        .bind(shipping_id)
        .bind(email)
        .fetch_optional(db)
        .await
    }
}
