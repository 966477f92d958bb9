//! Errors raised by the storefront services.
//!
//! Handlers convert these into [`crate::api::error::ApiError`]; nothing in
//! here knows about HTTP.

use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> messages, in a stable order
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {}", summarize(.0))]
    Validation(FieldErrors),

    #[error("authentication required")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid or expired code")]
    InvalidOrExpired,

    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid cart data: {0}")]
    InvalidCartData(String),

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    #[error("payment timed out")]
    PaymentTimeout,

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Error::Validation(errors)
    }
}

fn summarize(errors: &FieldErrors) -> String {
    errors.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Collects per-field problems and turns them into a single [`Error::Validation`]
#[derive(Debug, Default)]
pub struct FieldErrorsBuilder {
    errors: FieldErrors,
}

impl FieldErrorsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record `field` as missing when `value` is absent or blank
    pub fn require(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if value.map(str::trim).unwrap_or_default().is_empty() {
            self.add(field, format!("{} is required", field));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_missing_fields() {
        let mut builder = FieldErrorsBuilder::new();
        builder.require("city", None);
        builder.require("country", Some("   "));
        builder.require("address", Some("12 Canal St"));

        match builder.finish() {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.contains_key("city"));
                assert!(errors.contains_key("country"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_builder_is_ok() {
        assert!(FieldErrorsBuilder::new().finish().is_ok());
    }

    #[test]
    fn test_validation_display_lists_fields() {
        let err = Error::invalid_field("otp", "must be 6 digits");
        assert_eq!(err.to_string(), "validation failed: otp");
    }
}
