//! Common types and utilities shared across models.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Round a currency amount to cents, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Helper to serialize a money amount for a TEXT column ("270.00")
pub fn format_money(value: Decimal) -> String {
    round_money(value).to_string()
}

/// Helper to parse a money amount read from the database
pub fn parse_money(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| Error::Internal(format!("stored amount '{}' is not a decimal: {}", raw, e)))
}
