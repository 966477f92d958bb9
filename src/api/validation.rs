//! Input validation for API requests.
//!
//! Each validator returns the message to attach to the offending field.
//! To collect several failures into one response use
//! [`crate::error::FieldErrorsBuilder`].

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, FieldErrorsBuilder, Result};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const OTP_LENGTH: usize = 6;

lazy_static! {
    /// Pragmatic address check: local part, `@`, dotted domain with a TLD
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$"
    ).unwrap();

    /// Exactly six ASCII digits
    static ref OTP_REGEX: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a submitted one-time passcode
pub fn validate_otp_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("OTP is required".to_string());
    }

    if !OTP_REGEX.is_match(code) {
        return Err(format!("OTP must be exactly {} digits", OTP_LENGTH));
    }

    Ok(())
}

/// Validate a new account password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }

    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }

    if trimmed.chars().count() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check an email and turn a failure into a field error
pub fn require_valid_email(email: &str) -> Result<()> {
    validate_email(email).map_err(|msg| Error::invalid_field("email", msg))
}

/// Check an email and passcode together, reporting both fields at once
pub fn require_valid_email_and_code(email: &str, code: &str) -> Result<()> {
    let mut errors = FieldErrorsBuilder::new();
    if let Err(msg) = validate_email(email) {
        errors.add("email", msg);
    }
    if let Err(msg) = validate_otp_code(code) {
        errors.add("otp", msg);
    }
    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+art@studio.co.uk").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@@example.com").is_err());
        assert!(validate_email("user@example.").is_err());
    }

    #[test]
    fn test_otp_code_format() {
        assert!(validate_otp_code("012345").is_ok());
        assert!(validate_otp_code("12345").is_err());
        assert!(validate_otp_code("1234567").is_err());
        assert!(validate_otp_code("12a456").is_err());
        assert!(validate_otp_code("").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_name() {
        assert!(validate_name("Ada").is_ok());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_combined_check_reports_both_fields() {
        match require_valid_email_and_code("bad", "12") {
            Err(Error::Validation(errors)) => {
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("otp"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
