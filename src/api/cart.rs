use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::StatusMessage;
use super::authz::Identity;
use super::error::ApiError;
use crate::cart::{subtotal, CartLine};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CartItemsResponse {
    pub status: &'static str,
    pub cart_items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub art_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub cart_id: i64,
}

/// GET /cart/items
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<CartItemsResponse>, ApiError> {
    let lines = state.cart.get_cart(&identity.email).await?;
    let subtotal = subtotal(&lines)?;

    Ok(Json(CartItemsResponse {
        status: "success",
        cart_items: lines,
        subtotal,
        total_price: subtotal,
    }))
}

/// POST /cart/add
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    state.cart.add_item(&identity.email, request.art_id).await?;
    Ok(StatusMessage::success("Item added to cart"))
}

/// POST /cart/remove
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<Json<StatusMessage>, ApiError> {
    state
        .cart
        .remove_item(&identity.email, request.cart_id)
        .await?;
    Ok(StatusMessage::success("Item removed from cart"))
}
