use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::authz::{Capability, Identity};
use super::error::ApiError;
use crate::checkout::OrderDetails;
use crate::AppState;

/// GET /orders/:id - visible to the purchaser and to admins
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderDetails>, ApiError> {
    let can_view_all = identity.capability() >= Capability::Admin;
    let details = state
        .checkout
        .order_details(order_id, &identity.email, can_view_all)
        .await?;
    Ok(Json(details))
}
