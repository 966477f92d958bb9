//! Payment authorization.
//!
//! Checkout talks to a [`PaymentGateway`]; the only production implementation
//! is [`SimulatedGateway`], which approves a configurable share of charges
//! after an artificial processing delay.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::PaymentConfig;

/// How the customer chose to pay. Card data is reduced to what is safe to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    Card { card_holder: String, last4: String },
    Upi { upi_id: String },
    Cod,
}

impl PaymentMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMethod::Card { .. } => "card",
            PaymentMethod::Upi { .. } => "upi",
            PaymentMethod::Cod => "cod",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub email: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
    TimedOut,
}

impl PaymentOutcome {
    /// Label used for the `payments_total` metric
    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Approved { .. } => "approved",
            PaymentOutcome::Declined { .. } => "declined",
            PaymentOutcome::TimedOut => "timeout",
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &PaymentRequest) -> PaymentOutcome;
}

pub struct SimulatedGateway {
    success_rate: f64,
    processing_delay: Duration,
    timeout: Duration,
}

impl SimulatedGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            success_rate: config.success_rate.clamp(0.0, 1.0),
            processing_delay: Duration::from_millis(config.processing_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    async fn authorize(&self) -> PaymentOutcome {
        tokio::time::sleep(self.processing_delay).await;

        let approved = rand::rng().random_bool(self.success_rate);
        if approved {
            PaymentOutcome::Approved {
                reference: format!("pay_{}", uuid::Uuid::new_v4().simple()),
            }
        } else {
            PaymentOutcome::Declined {
                reason: "Payment was declined by the issuer".to_string(),
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[instrument(skip_all, fields(email = %request.email, amount = %request.amount, method = request.method.kind()))]
    async fn charge(&self, request: &PaymentRequest) -> PaymentOutcome {
        let outcome = match tokio::time::timeout(self.timeout, self.authorize()).await {
            Ok(outcome) => outcome,
            Err(_) => PaymentOutcome::TimedOut,
        };

        match &outcome {
            PaymentOutcome::Approved { reference } => {
                info!(reference = %reference, "Payment approved")
            }
            PaymentOutcome::Declined { reason } => warn!(reason = %reason, "Payment declined"),
            PaymentOutcome::TimedOut => warn!(timeout_ms = self.timeout.as_millis() as u64, "Payment timed out"),
        }

        outcome
    }
}

/// Last four digits of a card number, ignoring spaces and dashes
pub fn card_last4(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            email: "buyer@example.com".to_string(),
            amount: Decimal::new(27000, 2),
            method: PaymentMethod::Cod,
        }
    }

    fn gateway(success_rate: f64, delay_ms: u64, timeout_ms: u64) -> SimulatedGateway {
        SimulatedGateway::new(&PaymentConfig {
            success_rate,
            processing_delay_ms: delay_ms,
            timeout_ms,
        })
    }

    #[tokio::test]
    async fn test_always_approves_at_full_rate() {
        let outcome = gateway(1.0, 0, 1000).charge(&request()).await;
        match outcome {
            PaymentOutcome::Approved { reference } => assert!(reference.starts_with("pay_")),
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_always_declines_at_zero_rate() {
        let outcome = gateway(0.0, 0, 1000).charge(&request()).await;
        assert!(matches!(outcome, PaymentOutcome::Declined { .. }));
    }

    #[tokio::test]
    async fn test_slow_processor_times_out() {
        let outcome = gateway(1.0, 5_000, 20).charge(&request()).await;
        assert_eq!(outcome, PaymentOutcome::TimedOut);
    }

    #[test]
    fn test_card_last4() {
        assert_eq!(card_last4("4111 1111 1111 1234"), "1234");
        assert_eq!(card_last4("4111-1111-1111-9876"), "9876");
        assert_eq!(card_last4("12"), "12");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PaymentOutcome::TimedOut.label(), "timeout");
        assert_eq!(
            PaymentOutcome::Declined {
                reason: String::new()
            }
            .label(),
            "declined"
        );
    }
}
