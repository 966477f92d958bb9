pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod otp;
pub mod payment;

pub use db::DbPool;
pub use error::{Error, Result};

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::cart::{CartService, Pricing};
use crate::checkout::OrderPipeline;
use crate::notifications::Notifier;
use crate::otp::OtpService;
use crate::payment::PaymentGateway;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub otp: Arc<OtpService>,
    pub cart: CartService,
    pub checkout: OrderPipeline,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let pricing = Pricing::from(&config.checkout);
        let otp = Arc::new(OtpService::new(
            db.clone(),
            notifier.clone(),
            config.otp.ttl_minutes,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Self {
            cart: CartService::new(db.clone(), pricing),
            checkout: OrderPipeline::new(db.clone(), gateway, pricing),
            otp,
            notifier,
            rate_limiter,
            metrics_handle: None,
            config,
            db,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
