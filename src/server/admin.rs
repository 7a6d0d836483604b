//! Admin API handlers for license holder management.
//!
//! All endpoints require a bearer token from `POST /api/auth/login`.
//!
//! # Endpoints
//!
//! - `GET /api/users` - List users with their current lease
//! - `POST /api/users` - Create a user
//! - `PUT /api/users/:id` - Update a user
//! - `PATCH /api/users/:id/toggle-status` - Flip active/inactive
//! - `DELETE /api/users/:id` - Delete a user and its lease
//! - `GET /api/stats` - Dashboard counters
//! - `GET /api/logs` - Recent audit events
//! - `GET /api/error-reports` - Automation error reports
//! - `PATCH /api/error-reports/:id/resolve` - Mark a report resolved

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::auth::AuthenticatedAdmin;
use crate::server::database::{AuditEvent, ErrorReport, Lease, NewUser, Stats, User, UserUpdate};
use crate::server::handlers::{rfc3339, source_address, AppState};
use crate::server::logging::AuditKind;
use crate::server::validation::{
    parse_expiry_date, validate_email, validate_length, MAX_NAME_LEN, MIN_SECRET_LEN,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339
    pub expires_at: Option<String>,
}

/// Request body for updating a user. An absent or empty password keeps the current one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseResponse {
    pub machine_id: String,
    pub last_seen_at: String,
    /// Seen within the inactivity window
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub status: String,
    pub expires_at: String,
    pub expired: bool,
    pub created_at: String,
    pub lease: Option<LeaseResponse>,
}

impl UserResponse {
    fn build(user: User, lease: Option<Lease>, today: NaiveDate, cutoff: NaiveDateTime) -> Self {
        Self {
            id: user.id,
            expired: user.is_expired_on(today),
            status: user.status().as_str().to_string(),
            name: user.name,
            email: user.email,
            expires_at: user.expires_at.format("%Y-%m-%d").to_string(),
            created_at: rfc3339(user.created_at),
            lease: lease.map(|lease| LeaseResponse {
                online: !lease.is_stale(cutoff),
                machine_id: lease.machine_id,
                last_seen_at: rfc3339(lease.last_seen_at),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub expired_licenses: i64,
    pub online_users: i64,
}

impl From<Stats> for StatsResponse {
    fn from(stats: Stats) -> Self {
        Self {
            total_users: stats.total_users,
            active_users: stats.active_users,
            inactive_users: stats.inactive_users,
            expired_licenses: stats.expired_licenses,
            online_users: stats.online_users,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventResponse {
    pub id: i64,
    pub kind: String,
    pub actor: String,
    pub source_address: Option<String>,
    pub created_at: String,
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(event: AuditEvent) -> Self {
        Self {
            id: event.id,
            kind: event.kind,
            actor: event.actor,
            source_address: event.source_address,
            created_at: rfc3339(event.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportResponse {
    pub id: i64,
    pub email: String,
    pub user_name: Option<String>,
    pub message: String,
    pub reported_at: String,
    pub resolved: bool,
}

impl From<ErrorReport> for ErrorReportResponse {
    fn from(report: ErrorReport) -> Self {
        Self {
            id: report.id,
            email: report.email,
            user_name: report.user_name,
            message: report.message,
            reported_at: rfc3339(report.reported_at),
            resolved: report.resolved,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminMessage {
    pub message: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::missing_field(field))
}

/// Validated name, email and expiry shared by create and update.
fn checked_profile(
    name: Option<String>,
    email: Option<String>,
    expires_at: Option<String>,
) -> Result<(String, String, NaiveDate), ApiError> {
    let name = required(name, "name")?;
    let email = required(email, "email")?;
    let expires_at = required(expires_at, "expiresAt")?;

    validate_length(&name, "name", 1, MAX_NAME_LEN)?;
    validate_email(&email, "email")?;
    let expires_at = parse_expiry_date(&expires_at, "expiresAt")?;

    Ok((name, email, expires_at))
}

fn checked_password(password: &str) -> Result<(), ApiError> {
    validate_length(password, "password", MIN_SECRET_LEN, 1024)?;
    Ok(())
}

fn duplicate_email(err: crate::errors::LicenseError) -> ApiError {
    match err {
        crate::errors::LicenseError::Conflict(_) => ApiError::with_message(
            ErrorCode::Conflict,
            "A user with this email already exists",
        ),
        other => other.into(),
    }
}

/// Current date and online cutoff for response decoration.
fn clock(state: &AppState) -> (NaiveDate, NaiveDateTime) {
    let now = Utc::now().naive_utc();
    (now.date(), state.verifier.reaper().cutoff(now))
}

// ============================================================================
// Users
// ============================================================================

/// `GET /api/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
    _admin: AuthenticatedAdmin,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.db.list_users().await?;
    let mut leases: HashMap<String, Lease> = state
        .db
        .list_leases()
        .await?
        .into_iter()
        .map(|lease| (lease.email.clone(), lease))
        .collect();

    let (today, cutoff) = clock(&state);
    let body = users
        .into_iter()
        .map(|user| {
            let lease = leases.remove(&user.email);
            UserResponse::build(user, lease, today, cutoff)
        })
        .collect();

    Ok(Json(body))
}

/// `POST /api/users`
pub async fn create_user_handler(
    State(state): State<AppState>,
    admin: AuthenticatedAdmin,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(req) = payload.map_err(body_error)?;
    let (name, email, expires_at) = checked_profile(req.name, req.email, req.expires_at)?;
    let password = req.password.unwrap_or_default();
    if password.is_empty() {
        return Err(ApiError::missing_field("password"));
    }
    checked_password(&password)?;

    let secret_hash = state.hasher.hash_async(password).await?;
    let user = state
        .db
        .create_user(
            NewUser {
                name,
                email,
                secret_hash,
                expires_at,
            },
            Utc::now().naive_utc(),
        )
        .await
        .map_err(duplicate_email)?;

    let source = source_address(&headers, peer.as_ref());
    state
        .audit(AuditKind::UserCreated, &user.email, source.as_deref())
        .await?;
    info!("Admin {} created user {}", admin.email, user.email);

    let (today, cutoff) = clock(&state);
    Ok((
        StatusCode::CREATED,
        Json(UserResponse::build(user, None, today, cutoff)),
    ))
}

/// `PUT /api/users/:id`
pub async fn update_user_handler(
    State(state): State<AppState>,
    admin: AuthenticatedAdmin,
    Path(id): Path<i64>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(req) = payload.map_err(body_error)?;
    let (name, email, expires_at) = checked_profile(req.name, req.email, req.expires_at)?;

    let secret_hash = match req.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            checked_password(&password)?;
            Some(state.hasher.hash_async(password).await?)
        }
        None => None,
    };

    let existing = state
        .db
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    // The lease follows an email change; keep verifies for the old identity out.
    let seat = state.verifier.lock_identity(&existing.email).await;

    let user = state
        .db
        .update_user(
            id,
            UserUpdate {
                name,
                email,
                secret_hash,
                expires_at,
            },
        )
        .await
        .map_err(duplicate_email)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    drop(seat);

    let source = source_address(&headers, peer.as_ref());
    state
        .audit(AuditKind::UserUpdated, &user.email, source.as_deref())
        .await?;
    info!("Admin {} updated user {}", admin.email, user.email);

    let lease = state.db.get_lease(&user.email).await?;
    let (today, cutoff) = clock(&state);
    Ok(Json(UserResponse::build(user, lease, today, cutoff)))
}

/// `PATCH /api/users/:id/toggle-status`
pub async fn toggle_status_handler(
    State(state): State<AppState>,
    admin: AuthenticatedAdmin,
    Path(id): Path<i64>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .toggle_user_status(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let source = source_address(&headers, peer.as_ref());
    state
        .audit(AuditKind::UserStatusChanged, &user.email, source.as_deref())
        .await?;
    info!(
        "Admin {} set user {} to {}",
        admin.email,
        user.email,
        user.status().as_str()
    );

    let lease = state.db.get_lease(&user.email).await?;
    let (today, cutoff) = clock(&state);
    Ok(Json(UserResponse::build(user, lease, today, cutoff)))
}

/// `DELETE /api/users/:id`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    admin: AuthenticatedAdmin,
    Path(id): Path<i64>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<AdminMessage>, ApiError> {
    let existing = state
        .db
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let seat = state.verifier.lock_identity(&existing.email).await;
    let user = state
        .db
        .delete_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    drop(seat);

    let source = source_address(&headers, peer.as_ref());
    state
        .audit(AuditKind::UserDeleted, &user.email, source.as_deref())
        .await?;
    info!("Admin {} deleted user {}", admin.email, user.email);

    Ok(Json(AdminMessage {
        message: "deleted".to_string(),
    }))
}

// ============================================================================
// Dashboard
// ============================================================================

/// `GET /api/stats`
pub async fn stats_handler(
    State(state): State<AppState>,
    _admin: AuthenticatedAdmin,
) -> Result<Json<StatsResponse>, ApiError> {
    let (today, cutoff) = clock(&state);
    let stats = state.db.stats(today, cutoff).await?;
    Ok(Json(stats.into()))
}

/// `GET /api/logs`
pub async fn list_logs_handler(
    State(state): State<AppState>,
    _admin: AuthenticatedAdmin,
) -> Result<Json<Vec<AuditEventResponse>>, ApiError> {
    let events = state
        .db
        .list_audit_events(state.config.audit.list_limit)
        .await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// `GET /api/error-reports`
pub async fn list_error_reports_handler(
    State(state): State<AppState>,
    _admin: AuthenticatedAdmin,
) -> Result<Json<Vec<ErrorReportResponse>>, ApiError> {
    let reports = state.db.list_error_reports().await?;
    Ok(Json(reports.into_iter().map(Into::into).collect()))
}

/// `PATCH /api/error-reports/:id/resolve`
pub async fn resolve_error_report_handler(
    State(state): State<AppState>,
    admin: AuthenticatedAdmin,
    Path(id): Path<i64>,
) -> Result<Json<AdminMessage>, ApiError> {
    if !state.db.resolve_error_report(id).await? {
        return Err(ApiError::not_found("Error report"));
    }
    info!("Admin {} resolved error report {id}", admin.email);

    Ok(Json(AdminMessage {
        message: "resolved".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required(Some(" Ada ".into()), "name").unwrap(), "Ada");
        let err = required(Some("  ".into()), "name").unwrap_err();
        assert_eq!(err.error, ErrorCode::MissingField);
        assert!(required(None, "name").is_err());
    }

    #[test]
    fn profile_validation_reports_field() {
        let err = checked_profile(
            Some("Ada".into()),
            Some("not-an-email".into()),
            Some("2030-01-01".into()),
        )
        .unwrap_err();
        assert_eq!(err.error, ErrorCode::InvalidField);
        assert_eq!(err.details.unwrap()["field"], "email");
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(checked_password("abc").is_err());
        assert!(checked_password("abcdef").is_ok());
    }

    #[test]
    fn user_response_marks_expired_and_online() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let cutoff = today.and_hms_opt(11, 0, 0).unwrap();
        let user = User {
            id: 7,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            secret_hash: "x".into(),
            status: "active".into(),
            expires_at: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            created_at: cutoff,
        };
        let lease = Lease {
            email: "ada@example.com".into(),
            machine_id: "m1".into(),
            last_seen_at: today.and_hms_opt(11, 30, 0).unwrap(),
        };

        let resp = UserResponse::build(user, Some(lease), today, cutoff);
        assert!(resp.expired);
        assert_eq!(resp.expires_at, "2024-06-30");
        let lease = resp.lease.unwrap();
        assert!(lease.online);
        assert_eq!(lease.last_seen_at, "2024-07-01T11:30:00Z");
    }
}
