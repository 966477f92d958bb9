//! Order headers and their line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::common::{format_money, parse_money};
use crate::db::now_timestamp;
use crate::error::Result;

/// Lifecycle state of an order. Checkout only ever creates `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: i64,
    pub email: String,
    pub shipping_id: Option<i64>,
    pub total_price: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub order_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: i64,
    pub order_id: i64,
    pub art_id: i64,
    pub quantity: i64,
    pub price_at_purchase: String,
}

impl Order {
    pub fn total(&self) -> Result<Decimal> {
        parse_money(&self.total_price)
    }

    /// Insert a pending order header and return its id
    pub async fn create(
        conn: &mut SqliteConnection,
        email: &str,
        shipping_id: Option<i64>,
        total: Decimal,
        payment_reference: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (email, shipping_id, total_price, status, payment_reference, order_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(shipping_id)
        .bind(format_money(total))
        .bind(OrderStatus::Pending.as_str())
        .bind(payment_reference)
        .bind(now_timestamp())
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_id(db: &SqlitePool, order_id: i64) -> Result<Option<Order>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT order_id, email, shipping_id, total_price, status, payment_reference, order_date
            FROM orders
            WHERE order_id = ?
            "#,
        )
        .bind(order_id)
        .fetch_optional(db)
        .await
    }

    /// Order `order_id`, only if it was placed by `email`
    pub async fn find_for_user(
        db: &SqlitePool,
        order_id: i64,
        email: &str,
    ) -> Result<Option<Order>, sqlx::Error> {
        Ok(Self::find_by_id(db, order_id)
            .await?
            .filter(|order| order.email == email))
    }

    pub async fn count_for_user(db: &SqlitePool, email: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE email = ?")
            .bind(email)
            .fetch_one(db)
            .await
    }
}

impl OrderItem {
    pub fn price_at_purchase(&self) -> Result<Decimal> {
        parse_money(&self.price_at_purchase)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        order_id: i64,
        art_id: i64,
        quantity: i64,
        price_at_purchase: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, art_id, quantity, price_at_purchase)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(order_id)
        .bind(art_id)
        .bind(quantity)
        .bind(format_money(price_at_purchase))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_for_order(
        db: &SqlitePool,
        order_id: i64,
    ) -> Result<Vec<OrderItem>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT order_item_id, order_id, art_id, quantity, price_at_purchase
            FROM order_items
            WHERE order_id = ?
            ORDER BY order_item_id
            "#,
        )
        .bind(order_id)
        .fetch_all(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_roundtrip() {
        assert_eq!(OrderStatus::Pending.as_str(), "pending");
        assert_eq!("pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[tokio::test]
    async fn test_stored_status_is_typed() {
        use crate::db::{test_pool, Role, User};

        let pool = test_pool().await;
        User::create(&pool, "buyer@example.com", "Buyer", "hash", Role::User)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let order_id = Order::create(
            &mut conn,
            "buyer@example.com",
            None,
            Decimal::new(27000, 2),
            "pay_test",
        )
        .await
        .unwrap();
        drop(conn);

        let order = Order::find_by_id(&pool, order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        sqlx::query("UPDATE orders SET status = 'lost' WHERE order_id = ?")
            .bind(order_id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(Order::find_by_id(&pool, order_id).await.is_err());
    }
}
