//! Request validation utilities for the Seatgate API.
//!
//! This module provides validation functions for the input types accepted by
//! the admin and client endpoints.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid");
}

/// Longest accepted email address.
pub const MAX_EMAIL_LEN: usize = 254;
/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 200;
/// Longest accepted error report message.
pub const MAX_REPORT_LEN: usize = 4000;
/// Shortest accepted user secret.
pub const MIN_SECRET_LEN: usize = 6;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
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

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use seatgate::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds (in characters).
///
/// # Example
/// ```
/// use seatgate::server::validation::validate_length;
///
/// assert!(validate_length("hello", "name", 1, 10).is_ok());
/// assert!(validate_length("", "name", 1, 10).is_err());
/// assert!(validate_length("hello world!", "name", 1, 10).is_err());
/// ```
pub fn validate_length(
    value: &str,
    field_name: &str,
    min: usize,
    max: usize,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {min} characters"),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {max} characters"),
        ))
    } else {
        Ok(())
    }
}

/// Validate an email address (shape only, no deliverability check).
///
/// # Example
/// ```
/// use seatgate::server::validation::validate_email;
///
/// assert!(validate_email("ada@example.com", "email").is_ok());
/// assert!(validate_email("not-an-email", "email").is_err());
/// ```
pub fn validate_email(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_length(value, field_name, 3, MAX_EMAIL_LEN)?;
    if EMAIL_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "must be a valid email address",
        ))
    }
}

/// Parse an expiry date given as `YYYY-MM-DD` or as an RFC 3339 timestamp.
///
/// Timestamps keep only their calendar date (in their own offset).
///
/// # Example
/// ```
/// use seatgate::server::validation::parse_expiry_date;
///
/// assert!(parse_expiry_date("2025-12-31", "expiresAt").is_ok());
/// assert!(parse_expiry_date("2025-12-31T00:00:00Z", "expiresAt").is_ok());
/// assert!(parse_expiry_date("next tuesday", "expiresAt").is_err());
/// ```
pub fn parse_expiry_date(value: &str, field_name: &str) -> ValidationResult<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| {
            ValidationError::new(
                field_name,
                "must be a date (YYYY-MM-DD) or RFC 3339 timestamp",
            )
        })
}
