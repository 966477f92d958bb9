//! Cart aggregation and pricing.
//!
//! Lines come either from the persisted cart or from a client-side snapshot
//! posted with the checkout page. Snapshot prices are never trusted: every
//! line is repriced from the `art` table before totals are computed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::config::CheckoutConfig;
use crate::db::{round_money, parse_money, Artwork, CartItem, CartLineRow, DbPool};
use crate::error::{Error, Result};

/// One priced line of a cart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    /// Row id in the persisted cart; absent for snapshot lines
    pub cart_id: Option<i64>,
    pub art_id: i64,
    pub title: String,
    pub image_path: Option<String>,
    pub price: Decimal,
    pub quantity: i64,
}

impl CartLine {
    /// `price * quantity`; amounts too large to represent are invalid cart data
    pub fn line_total(&self) -> Result<Decimal> {
        self.price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| too_large(self.art_id))
    }
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = Error;

    fn try_from(row: CartLineRow) -> Result<Self> {
        Ok(Self {
            cart_id: Some(row.cart_id),
            art_id: row.art_id,
            title: row.title,
            image_path: row.image_path,
            price: parse_money(&row.price)?,
            quantity: row.quantity,
        })
    }
}

/// Shipping fee and tax rate applied to a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub shipping_fee: Decimal,
    pub tax_rate: Decimal,
}

impl From<&CheckoutConfig> for Pricing {
    fn from(config: &CheckoutConfig) -> Self {
        Self {
            shipping_fee: config.shipping_fee,
            tax_rate: config.tax_rate,
        }
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::from(&CheckoutConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub item_count: i64,
}

/// Sum of `price * quantity` over all lines
fn too_large(art_id: i64) -> Error {
    Error::InvalidCartData(format!("amount for artwork {} is too large", art_id))
}

pub fn subtotal(lines: &[CartLine]) -> Result<Decimal> {
    lines.iter().try_fold(Decimal::ZERO, |sum, line| {
        sum.checked_add(line.line_total()?)
            .ok_or_else(|| too_large(line.art_id))
    })
}

/// Price a cart: subtotal, flat shipping, half-up rounded tax and total
pub fn compute_totals(lines: &[CartLine], pricing: &Pricing) -> Result<CartTotals> {
    if lines.is_empty() {
        return Err(Error::EmptyCart);
    }

    for line in lines {
        if line.quantity <= 0 {
            return Err(Error::InvalidCartData(format!(
                "quantity for artwork {} must be positive",
                line.art_id
            )));
        }
        if line.price <= Decimal::ZERO {
            return Err(Error::InvalidCartData(format!(
                "price for artwork {} must be positive",
                line.art_id
            )));
        }
    }

    let cart_too_large = || Error::InvalidCartData("cart total is too large".to_string());

    let subtotal = round_money(subtotal(lines)?);
    let shipping = round_money(pricing.shipping_fee);
    let tax = round_money(
        subtotal
            .checked_mul(pricing.tax_rate)
            .ok_or_else(cart_too_large)?,
    );
    let total = subtotal
        .checked_add(shipping)
        .and_then(|sum| sum.checked_add(tax))
        .ok_or_else(cart_too_large)?;
    let item_count = lines
        .iter()
        .try_fold(0i64, |count, line| count.checked_add(line.quantity))
        .ok_or_else(cart_too_large)?;

    Ok(CartTotals {
        subtotal,
        shipping,
        tax,
        total,
        item_count,
    })
}

/// One entry of a cart serialized by the client.
///
/// Every field is optional on the wire so a missing key can be reported as
/// invalid cart data instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartSnapshotItem {
    pub art_id: Option<Value>,
    pub price: Option<Value>,
    pub quantity: Option<Value>,
    pub title: Option<String>,
    pub image_path: Option<String>,
}

/// A snapshot entry that passed structural validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSnapshotItem {
    pub art_id: i64,
    pub client_price: Option<Decimal>,
    pub quantity: i64,
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check that every snapshot entry carries the required keys and a
/// positive integer quantity
pub fn validate_snapshot(items: &[CartSnapshotItem]) -> Result<Vec<ValidatedSnapshotItem>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let mut missing = Vec::new();
            if item.art_id.is_none() {
                missing.push("art_id");
            }
            if item.price.is_none() {
                missing.push("price");
            }
            if item.quantity.is_none() {
                missing.push("quantity");
            }
            if item.title.is_none() {
                missing.push("title");
            }
            if item.image_path.is_none() {
                missing.push("image_path");
            }
            if !missing.is_empty() {
                return Err(Error::InvalidCartData(format!(
                    "item {} is missing {}",
                    index,
                    missing.join(", ")
                )));
            }

            let art_id = item.art_id.as_ref().and_then(value_as_i64).ok_or_else(|| {
                Error::InvalidCartData(format!("item {} has an invalid art_id", index))
            })?;

            let quantity = item
                .quantity
                .as_ref()
                .and_then(value_as_i64)
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    Error::InvalidCartData(format!(
                        "item {} quantity must be a positive integer",
                        index
                    ))
                })?;

            Ok(ValidatedSnapshotItem {
                art_id,
                client_price: item.price.as_ref().and_then(value_as_decimal),
                quantity,
            })
        })
        .collect()
}

/// Lines and totals shown on the checkout page
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub cart_items: Vec<CartLine>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

pub struct CartService {
    db: DbPool,
    pricing: Pricing,
}

impl CartService {
    pub fn new(db: DbPool, pricing: Pricing) -> Self {
        Self { db, pricing }
    }

    /// The user's persisted cart, oldest row first
    pub async fn get_cart(&self, email: &str) -> Result<Vec<CartLine>> {
        CartItem::list_lines(&self.db, email)
            .await?
            .into_iter()
            .map(CartLine::try_from)
            .collect()
    }

    /// Add one unit of `art_id`, merging with an existing row
    pub async fn add_item(&self, email: &str, art_id: i64) -> Result<CartItem> {
        if Artwork::find_by_id(&self.db, art_id).await?.is_none() {
            return Err(Error::NotFound("Artwork".to_string()));
        }

        let item = CartItem::add_or_increment(&self.db, email, art_id).await?;
        debug!(email = %email, art_id, quantity = item.quantity, "Added artwork to cart");
        Ok(item)
    }

    /// Remove one of the user's rows; removing a row that is not there succeeds
    pub async fn remove_item(&self, email: &str, cart_id: i64) -> Result<()> {
        let removed = CartItem::remove(&self.db, email, cart_id).await?;
        debug!(email = %email, cart_id, removed, "Removed cart row");
        Ok(())
    }

    /// Remove exactly the ordered `lines` from the user's cart on `conn`,
    /// typically inside a checkout transaction
    pub async fn consume_ordered(
        conn: &mut SqliteConnection,
        email: &str,
        lines: &[CartLine],
    ) -> Result<()> {
        for line in lines {
            if let Some(cart_id) = line.cart_id {
                CartItem::consume(&mut *conn, email, cart_id, line.quantity).await?;
            }
        }
        Ok(())
    }

    /// Turn a client snapshot into lines priced from the catalogue
    pub async fn reprice_snapshot(&self, items: &[CartSnapshotItem]) -> Result<Vec<CartLine>> {
        let validated = validate_snapshot(items)?;
        let mut lines = Vec::with_capacity(validated.len());

        for item in validated {
            let artwork = Artwork::find_by_id(&self.db, item.art_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Artwork {}", item.art_id)))?;
            let price = artwork.price()?;

            if let Some(client_price) = item.client_price {
                if client_price != price {
                    warn!(
                        art_id = item.art_id,
                        client_price = %client_price,
                        server_price = %price,
                        "Cart snapshot price differs from catalogue, using catalogue price"
                    );
                }
            }

            lines.push(CartLine {
                cart_id: None,
                art_id: artwork.art_id,
                title: artwork.title,
                image_path: artwork.image_path,
                price,
                quantity: item.quantity,
            });
        }

        Ok(lines)
    }

    /// Lines and totals for the checkout page. A snapshot, when given,
    /// replaces the persisted cart for this request only.
    pub async fn summary(
        &self,
        email: &str,
        snapshot: Option<&[CartSnapshotItem]>,
    ) -> Result<CartSummary> {
        let lines = match snapshot {
            Some(items) => self.reprice_snapshot(items).await?,
            None => self.get_cart(email).await?,
        };
        let totals = compute_totals(&lines, &self.pricing)?;
        Ok(CartSummary {
            cart_items: lines,
            totals,
        })
    }
}
