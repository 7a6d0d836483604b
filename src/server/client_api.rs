//! Client API endpoints used by the desktop automation client.
//!
//! These endpoints do not require authentication but can be rate-limited.
//!
//! # Endpoints
//!
//! - `POST /api/auth/verify` - Verify credentials and claim the seat for a machine
//! - `POST /api/auth/release` - Free the seat held by a machine
//! - `POST /api/error-reports` - Submit an automation failure report

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::{source_address, AppState};
use crate::server::logging::{log_seat_event, AuditKind, SeatEvent};
use crate::server::validation::{validate_length, validate_not_empty, MAX_REPORT_LEN};
use crate::server::verifier::VerifyOutcome;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to verify a license for a machine.
///
/// Every field is optional at the wire level so that a missing machine
/// identifier can be reported as such instead of as a malformed body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default, alias = "email")]
    pub identity: Option<String>,
    #[serde(default, alias = "password")]
    pub secret: Option<String>,
    #[serde(default, alias = "machine_id")]
    pub machine_id: Option<String>,
}

/// Response from a successful verification.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    /// Last usable day (`YYYY-MM-DD`)
    pub valid_until: String,
    pub status: String,
}

/// Request to release a machine's seat.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    #[serde(default, alias = "email")]
    pub identity: Option<String>,
    #[serde(default, alias = "machine_id")]
    pub machine_id: Option<String>,
}

/// Acknowledgement body shared by release and error-report endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Automation failure report submitted by the client.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorReportRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/auth/verify`
pub async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = payload.map_err(body_error)?;
    let identity = req.identity.unwrap_or_default();
    let secret = req.secret.unwrap_or_default();
    let machine_id = req.machine_id;

    let outcome = state
        .verifier
        .verify(&identity, &secret, machine_id.as_deref())
        .await?;

    let machine = machine_id.as_deref().unwrap_or_default();
    let audit_kind = match &outcome {
        VerifyOutcome::Allowed(_) => AuditKind::VerifyAllowed,
        VerifyOutcome::Denied(_) => AuditKind::VerifyDenied,
    };
    if state.config.audit.log_verifications {
        let source = source_address(&headers, peer.as_ref());
        if let Err(e) = state.audit(audit_kind, &identity, source.as_deref()).await {
            warn!("Failed to record verification audit event: {e}");
        }
    }

    match outcome {
        VerifyOutcome::Allowed(grant) => {
            log_seat_event(SeatEvent::Granted, &identity, machine, None);
            Ok(Json(VerifyResponse {
                valid: true,
                valid_until: grant.valid_until.format("%Y-%m-%d").to_string(),
                status: grant.status.as_str().to_string(),
            }))
        }
        VerifyOutcome::Denied(reason) => {
            log_seat_event(SeatEvent::Denied, &identity, machine, Some(reason.as_str()));
            Err(reason.into())
        }
    }
}

/// `POST /api/auth/release`
///
/// Always answers `200 {message: "released"}` unless the store fails.
pub async fn release_handler(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();

    let removed = state
        .verifier
        .release(req.identity.as_deref(), req.machine_id.as_deref())
        .await?;

    let identity = req.identity.as_deref().unwrap_or_default();
    let machine = req.machine_id.as_deref().unwrap_or_default();
    if removed {
        log_seat_event(SeatEvent::Released, identity, machine, None);
    } else {
        log_seat_event(SeatEvent::ReleaseIgnored, identity, machine, None);
    }

    Ok(Json(MessageResponse::new("released")))
}

/// `POST /api/error-reports`
pub async fn report_error_handler(
    State(state): State<AppState>,
    payload: Result<Json<ErrorReportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(req) = payload.map_err(body_error)?;
    let email = req.email.unwrap_or_default();
    let message = req.message.unwrap_or_default();

    validate_not_empty(&email, "email")?;
    validate_not_empty(&message, "message")?;
    validate_length(&message, "message", 1, MAX_REPORT_LEN)?;

    state
        .db
        .create_error_report(email.trim(), message.trim(), Utc::now().naive_utc())
        .await?;
    log_seat_event(SeatEvent::ErrorReported, email.trim(), "", None);

    Ok((StatusCode::CREATED, Json(MessageResponse::new("recorded"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_request_accepts_aliases() {
        let req: VerifyRequest = serde_json::from_str(
            r#"{"email":"ada@example.com","password":"pw","machineId":"m1"}"#,
        )
        .unwrap();
        assert_eq!(req.identity.as_deref(), Some("ada@example.com"));
        assert_eq!(req.secret.as_deref(), Some("pw"));
        assert_eq!(req.machine_id.as_deref(), Some("m1"));
    }

    #[test]
    fn verify_request_allows_missing_machine_id() {
        let req: VerifyRequest =
            serde_json::from_str(r#"{"identity":"ada@example.com","secret":"pw"}"#).unwrap();
        assert!(req.machine_id.is_none());
    }

    #[test]
    fn verify_response_is_camel_case() {
        let json = serde_json::to_value(VerifyResponse {
            valid: true,
            valid_until: "2030-01-01".into(),
            status: "active".into(),
        })
        .unwrap();
        assert_eq!(json["validUntil"], "2030-01-01");
        assert_eq!(json["valid"], true);
    }
}
