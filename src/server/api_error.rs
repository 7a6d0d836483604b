//! Standardized API error responses for all Seatgate endpoints.
//!
//! # Response Format
//!
//! Every error response is a flat JSON object:
//!
//! ```json
//! {
//!   "error": "machine_conflict",
//!   "message": "License is in use on another machine",
//!   "lastSeenAt": "2024-06-30T12:00:00Z"
//! }
//! ```
//!
//! `lastSeenAt` is only present for `machine_conflict`; `details` only when a
//! field-level validation failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;
use crate::server::handlers::rfc3339;
use crate::server::validation::ValidationError;
use crate::server::verifier::DenyReason;

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // === License Denials ===
    /// No user with this identity
    NotFound,
    /// User account is not active
    Inactive,
    /// License expiry date has passed
    Expired,
    /// Secret does not match
    BadCredentials,
    /// Seat is held by another machine
    MachineConflict,

    // === Validation Errors (400) ===
    /// Machine identifier missing or empty
    MissingMachineId,
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Authentication Errors (401) ===
    /// No authentication token provided
    MissingToken,
    /// Authorization header is malformed
    InvalidHeader,
    /// Authentication token is invalid
    InvalidToken,
    /// Authentication token has expired
    TokenExpired,
    /// Authentication is not configured on server
    AuthDisabled,

    // === Resource Errors ===
    /// Operation conflicts with current state (e.g. duplicate email)
    Conflict,

    // === Server Errors (5xx) ===
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::MissingMachineId
            | ErrorCode::InvalidRequest
            | ErrorCode::MissingField
            | ErrorCode::InvalidField
            | ErrorCode::InvalidHeader => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            ErrorCode::BadCredentials
            | ErrorCode::MissingToken
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            ErrorCode::Inactive | ErrorCode::Expired | ErrorCode::MachineConflict => {
                StatusCode::FORBIDDEN
            }

            // 404 Not Found
            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::Conflict => StatusCode::CONFLICT,

            // 500 Internal Server Error
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            // 501 Not Implemented
            ErrorCode::AuthDisabled => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::Inactive => "License is not active",
            ErrorCode::Expired => "License has expired",
            ErrorCode::BadCredentials => "Invalid email or password",
            ErrorCode::MachineConflict => "License is in use on another machine",
            ErrorCode::MissingMachineId => "Machine identifier is required",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::MissingToken => "Authentication token is required",
            ErrorCode::InvalidHeader => "Authorization header is malformed",
            ErrorCode::InvalidToken => "Authentication token is invalid",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::AuthDisabled => "Authentication is not configured on this server",
            ErrorCode::Conflict => "Operation conflicts with current resource state",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code
    pub error: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// When the conflicting machine last verified (RFC 3339, UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<String>,
    /// Optional additional details (field name, constraint violated, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: code,
            message: message.into(),
            last_seen_at: None,
            details: None,
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::with_message(code, message)
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    /// Invalid request error with field details.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{field}': {reason}"),
            serde_json::json!({ "field": field }),
        )
    }

    /// Missing required field error.
    pub fn missing_field(field: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingField,
            format!("Required field '{field}' is missing"),
            serde_json::json!({ "field": field }),
        )
    }

    /// Resource not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{resource} not found"))
    }

    /// Internal server error. Details are never sent to the client.
    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error, self.message)
    }
}

impl std::error::Error for ApiError {}

// === Conversions ===

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::NotFound => {
                ApiError::with_message(ErrorCode::NotFound, "No license found for this email")
            }
            DenyReason::Inactive => ApiError::new(ErrorCode::Inactive),
            DenyReason::Expired => ApiError::new(ErrorCode::Expired),
            DenyReason::BadCredentials => ApiError::new(ErrorCode::BadCredentials),
            DenyReason::MachineConflict { last_seen_at } => ApiError {
                last_seen_at: Some(rfc3339(last_seen_at)),
                ..ApiError::new(ErrorCode::MachineConflict)
            },
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

/// Server faults are logged here and returned as a generic 500.
impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::MissingMachineId => ApiError::new(ErrorCode::MissingMachineId),
            LicenseError::InvalidRequest(msg) => {
                ApiError::with_message(ErrorCode::InvalidRequest, msg)
            }
            LicenseError::Conflict(_) => ApiError::new(ErrorCode::Conflict),
            other => {
                error!("Request failed with server fault: {other}");
                ApiError::internal_error()
            }
        }
    }
}

impl IntoResponse for LicenseError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
