use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::authz::Identity;
use super::error::ApiError;
use crate::cart::{CartLine, CartSnapshotItem};
use crate::checkout::{CheckoutRequest, ShippingForm};
use crate::error::Error;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutQuery {
    /// JSON-encoded cart kept by the client
    pub cart: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutPageResponse {
    pub cart_items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ShippingSavedResponse {
    pub status: &'static str,
    pub message: String,
    pub shipping_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub status: &'static str,
    pub message: String,
    pub order_id: i64,
    pub total: Decimal,
    pub payment_reference: String,
}

fn parse_snapshot(raw: &str) -> Result<Vec<CartSnapshotItem>, Error> {
    serde_json::from_str(raw).map_err(|e| Error::InvalidCartData(e.to_string()))
}

/// GET /checkout - lines and totals for the checkout page
pub async fn checkout_page(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<CheckoutQuery>,
) -> Result<Json<CheckoutPageResponse>, ApiError> {
    let snapshot = match query.cart.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_snapshot(raw)?),
        _ => None,
    };

    let summary = state
        .cart
        .summary(&identity.email, snapshot.as_deref())
        .await?;

    Ok(Json(CheckoutPageResponse {
        cart_items: summary.cart_items,
        subtotal: summary.totals.subtotal,
        shipping: summary.totals.shipping,
        tax: summary.totals.tax,
        total: summary.totals.total,
    }))
}

/// POST /process_shipping - save an address for the upcoming payment step
pub async fn process_shipping(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(form): Json<ShippingForm>,
) -> Result<Json<ShippingSavedResponse>, ApiError> {
    let shipping_id = state
        .checkout
        .save_shipping(&identity.email, &form)
        .await?;

    Ok(Json(ShippingSavedResponse {
        status: "success",
        message: "Shipping information saved".to_string(),
        shipping_id,
    }))
}

/// POST /process_payment - charge and place the order
pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let receipt = state.checkout.checkout(&identity.email, request).await?;

    Ok(Json(PaymentResponse {
        status: "success",
        message: "Order placed successfully".to_string(),
        order_id: receipt.order_id,
        total: receipt.totals.total,
        payment_reference: receipt.payment_reference,
    }))
}
