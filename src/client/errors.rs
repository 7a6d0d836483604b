//! Client-side error types for the Seatgate license client.
//!
//! These mirror the server's flat error body so callers can branch on the
//! denial reason without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes returned by the Seatgate license server API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorCode {
    // === License Denials ===
    /// No account with this email
    NotFound,
    /// Account is deactivated
    Inactive,
    /// Account expiry date has passed
    Expired,
    /// Password does not match
    BadCredentials,
    /// Another machine holds the seat
    MachineConflict,

    // === Request Errors ===
    /// The request carried no machine identifier
    MissingMachineId,
    /// Request payload was rejected
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Server Errors ===
    /// Internal server error
    InternalError,
    /// Server answered with something that is not an error body
    UnexpectedResponse,

    // === Unknown ===
    /// Unknown error code (forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ClientErrorCode {
    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ClientErrorCode::NotFound => "No account exists for this email",
            ClientErrorCode::Inactive => "This account is inactive",
            ClientErrorCode::Expired => "This license has expired",
            ClientErrorCode::BadCredentials => "Email or password is incorrect",
            ClientErrorCode::MachineConflict => "This license is in use on another machine",
            ClientErrorCode::MissingMachineId => "Machine identifier is missing",
            ClientErrorCode::InvalidRequest => "Request was rejected by the server",
            ClientErrorCode::MissingField => "A required field is missing",
            ClientErrorCode::InvalidField => "A field value is invalid",
            ClientErrorCode::InternalError => "Internal server error",
            ClientErrorCode::UnexpectedResponse => "Unexpected response from license server",
            ClientErrorCode::Unknown => "Unknown error",
        }
    }

    /// Returns true if the license cannot be used until an admin acts.
    pub fn is_license_invalid(&self) -> bool {
        matches!(
            self,
            ClientErrorCode::NotFound | ClientErrorCode::Inactive | ClientErrorCode::Expired
        )
    }

    /// Returns true if the server refused the license itself.
    ///
    /// Server faults, malformed responses and unknown codes are not denials.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            ClientErrorCode::NotFound
                | ClientErrorCode::Inactive
                | ClientErrorCode::Expired
                | ClientErrorCode::BadCredentials
                | ClientErrorCode::MachineConflict
        )
    }

    /// Returns true if the user can resolve this without an admin.
    ///
    /// A machine conflict clears once the other machine releases its seat or
    /// goes quiet; every other denial means going back to the login screen.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientErrorCode::MachineConflict)
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message())
    }
}

/// Server API error body.
///
/// ```json
/// {
///   "error": "machine_conflict",
///   "message": "License is in use on another machine",
///   "lastSeenAt": "2025-01-01T10:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorResponse {
    pub error: ClientErrorCode,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Error returned when a license server API call is refused.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ClientApiError {
    /// Machine-readable error code
    pub code: ClientErrorCode,
    /// Human-readable error message from server
    pub message: String,
    /// For `machine_conflict`, when the seat holder last verified
    pub last_seen_at: Option<String>,
    /// HTTP status the server answered with, when there was one
    pub status: Option<u16>,
}

impl ClientApiError {
    /// Create a new client API error.
    pub fn new(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            last_seen_at: None,
            status: None,
        }
    }

    /// Decode a non-success response body.
    ///
    /// Bodies that are not a server error object become `UnexpectedResponse`.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ServerErrorResponse>(body) {
            Ok(resp) => {
                let mut err: ClientApiError = resp.into();
                err.status = Some(status);
                err
            }
            Err(_) => Self {
                status: Some(status),
                ..Self::new(
                    ClientErrorCode::UnexpectedResponse,
                    format!("HTTP {status}"),
                )
            },
        }
    }

    /// Returns true if the license cannot be used until an admin acts.
    pub fn is_license_invalid(&self) -> bool {
        self.code.is_license_invalid()
    }

    /// See [`ClientErrorCode::is_denial`].
    pub fn is_denial(&self) -> bool {
        self.code.is_denial()
    }

    /// See [`ClientErrorCode::is_recoverable`].
    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }
}

impl From<ServerErrorResponse> for ClientApiError {
    fn from(resp: ServerErrorResponse) -> Self {
        let message = resp
            .message
            .unwrap_or_else(|| resp.error.default_message().to_string());
        Self {
            code: resp.error,
            message,
            last_seen_at: resp.last_seen_at,
            status: None,
        }
    }
}
