pub mod auth;
pub mod authz;
mod cart;
mod checkout;
pub mod error;
pub mod metrics;
mod orders;
pub mod rate_limit;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;
use authz::Capability;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Sign-in and signup (public, stricter rate limit)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/send-otp", post(auth::send_otp))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/send-signup-otp", post(auth::send_signup_otp))
        .route("/verify-signup-otp", post(auth::verify_signup_otp))
        .route("/logout", post(auth::logout))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route("/upgrade-to-artist", post(auth::upgrade_to_artist))
                .layer(middleware::from_fn_with_state(
                    Capability::User,
                    authz::require_capability,
                )),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Storefront routes for signed-in users
    let shop_routes = Router::new()
        // Cart
        .route("/cart/items", get(cart::list_items))
        .route("/cart/add", post(cart::add_item))
        .route("/cart/remove", post(cart::remove_item))
        // Checkout
        .route("/checkout", get(checkout::checkout_page))
        .route("/process_shipping", post(checkout::process_shipping))
        .route("/process_payment", post(checkout::process_payment))
        // Orders
        .route("/orders/:id", get(orders::get_order))
        .layer(middleware::from_fn_with_state(
            Capability::User,
            authz::require_capability,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/auth", auth_routes)
        .merge(shop_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authz::identity_middleware,
        ))
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
