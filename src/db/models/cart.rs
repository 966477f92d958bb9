//! Persisted cart rows.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqliteExecutor, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub cart_id: i64,
    pub email: String,
    pub art_id: i64,
    pub quantity: i64,
}

/// A cart row joined with the artwork it points at
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartLineRow {
    pub cart_id: i64,
    pub art_id: i64,
    pub title: String,
    pub image_path: Option<String>,
    pub price: String,
    pub quantity: i64,
}

impl CartItem {
    /// Insert a row with quantity 1, or bump the existing row for the same artwork
    pub async fn add_or_increment(
        db: &SqlitePool,
        email: &str,
        art_id: i64,
    ) -> Result<CartItem, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO cart (email, art_id, quantity)
            VALUES (?, ?, 1)
            ON CONFLICT(email, art_id) DO UPDATE SET quantity = quantity + 1
            RETURNING cart_id, email, art_id, quantity
            "#,
        )
        .bind(email)
        .bind(art_id)
        .fetch_one(db)
        .await
    }

    pub async fn list_lines<'e, E: SqliteExecutor<'e>>(
        db: E,
        email: &str,
    ) -> Result<Vec<CartLineRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT c.cart_id, a.art_id, a.title, a.image_path, a.price, c.quantity
            FROM cart c
            JOIN art a ON c.art_id = a.art_id
            WHERE c.email = ?
            ORDER BY c.cart_id
            "#,
        )
        .bind(email)
        .fetch_all(db)
        .await
    }

    /// Delete one of the user's rows; zero rows affected is not an error
    pub async fn remove(db: &SqlitePool, email: &str, cart_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cart WHERE cart_id = ? AND email = ?")
            .bind(cart_id)
            .bind(email)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Take `quantity` units off one of the user's rows, deleting the row
    /// once nothing is left. Units added after the row was read survive.
    pub async fn consume(
        conn: &mut SqliteConnection,
        email: &str,
        cart_id: i64,
        quantity: i64,
    ) -> Result<(), sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM cart WHERE cart_id = ? AND email = ? AND quantity <= ?")
            .bind(cart_id)
            .bind(email)
            .bind(quantity)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if deleted == 0 {
            sqlx::query("UPDATE cart SET quantity = quantity - ? WHERE cart_id = ? AND email = ?")
                .bind(quantity)
                .bind(cart_id)
                .bind(email)
                .execute(conn)
                .await?;
        }
        Ok(())
    }
}
