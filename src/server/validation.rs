//! Request validation utilities for the panel endpoints.

use regex::Regex;
use serde_json::json;
use std::fmt;
use std::sync::OnceLock;

use crate::server::api_error::{ApiError, ErrorCode};

/// Validation error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::with_details(
            ErrorCode::InvalidField,
            err.to_string(),
            json!({ "field": err.field }),
        )
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn serial_regex() -> &'static Regex {
    static SERIAL: OnceLock<Regex> = OnceLock::new();
    SERIAL.get_or_init(|| Regex::new(r"^[^\p{Cc}]{1,128}$").expect("serial pattern compiles"))
}

/// Validate a serial: 1 to 128 characters, none of them control characters.
///
/// Spaces and non-ASCII text are stored as submitted.
///
/// # Example
/// ```
/// use serialdesk::server::validation::validate_serial;
///
/// assert!(validate_serial("aB3dE5fG7hJ9kL1", "serial").is_ok());
/// assert!(validate_serial("has space", "serial").is_ok());
/// assert!(validate_serial("", "serial").is_err());
/// assert!(validate_serial("line\nbreak", "serial").is_err());
/// ```
pub fn validate_serial(value: &str, field_name: &str) -> ValidationResult<()> {
    if serial_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "serial must be 1-128 characters without control characters",
        ))
    }
}

/// Validate that a string is not empty or whitespace only.
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate a day count for date adjustments; must be at least 1.
pub fn validate_days(days: i64, field_name: &str) -> ValidationResult<u32> {
    if days < 1 {
        return Err(ValidationError::new(field_name, "must be at least 1"));
    }
    u32::try_from(days).map_err(|_| ValidationError::new(field_name, "is too large"))
}

/// Validate a requested batch size against the configured maximum.
pub fn validate_batch_size(count: i64, max: u32, field_name: &str) -> ValidationResult<u32> {
    if count < 1 || count > i64::from(max) {
        return Err(ValidationError::new(
            field_name,
            format!("must be between 1 and {max}"),
        ));
    }
    u32::try_from(count).map_err(|_| ValidationError::new(field_name, "is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_serial() {
        assert!(validate_serial("ABCdef123456789", "serial").is_ok());
        assert!(validate_serial("PURGE-1_x", "serial").is_ok());
        assert!(validate_serial("", "serial").is_err());
        assert!(validate_serial("tab\there", "serial").is_err());
        assert!(validate_serial("two words", "serial").is_ok());
        assert!(validate_serial("clé-ÄÖ", "serial").is_ok());
        assert!(validate_serial(&"é".repeat(128), "serial").is_ok());
        assert!(validate_serial(&"x".repeat(129), "serial").is_err());
    }

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("WEEK", "license").is_ok());
        assert!(validate_not_empty("  ", "license").is_err());
    }

    #[test]
    fn test_validate_days() {
        assert_eq!(validate_days(7, "days"), Ok(7));
        assert!(validate_days(0, "days").is_err());
        assert!(validate_days(-3, "days").is_err());
        assert!(validate_days(i64::from(u32::MAX) + 1, "days").is_err());
    }

    #[test]
    fn test_validate_batch_size() {
        assert_eq!(validate_batch_size(10, 1000, "numLicenses"), Ok(10));
        assert!(validate_batch_size(0, 1000, "numLicenses").is_err());
        assert!(validate_batch_size(1001, 1000, "numLicenses").is_err());
    }

    #[test]
    fn validation_error_becomes_invalid_field() {
        let api: ApiError = ValidationError::new("days", "must be at least 1").into();
        assert_eq!(api.error, ErrorCode::InvalidField);
        assert_eq!(api.details.unwrap()["field"], "days");
    }
}
