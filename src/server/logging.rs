//! Request logging middleware and structured seat events.
//!
//! This module provides structured logging for all API requests including:
//! - Unique request ID tracking
//! - Request timing
//! - Method, path, and status logging
//! - Request ID propagation in response headers
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use seatgate::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Seat lifecycle events traced by the license endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatEvent {
    /// Verification succeeded and the lease was written
    Granted,
    /// Verification was refused
    Denied,
    /// A machine released its seat
    Released,
    /// Release request matched no lease
    ReleaseIgnored,
    /// A client submitted an automation error report
    ErrorReported,
}

impl std::fmt::Display for SeatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SeatEvent::Granted => "granted",
            SeatEvent::Denied => "denied",
            SeatEvent::Released => "released",
            SeatEvent::ReleaseIgnored => "release_ignored",
            SeatEvent::ErrorReported => "error_reported",
        };
        write!(f, "{}", s)
    }
}

/// Log a seat lifecycle event inside its own span.
pub fn log_seat_event(event: SeatEvent, identity: &str, machine_id: &str, details: Option<&str>) {
    let span = info_span!(
        "seat_event",
        event = %event,
        identity = %identity,
        machine_id = %machine_id,
    );
    let _enter = span.enter();

    match (event, details) {
        (SeatEvent::Denied, Some(reason)) => warn!(reason = %reason, "Seat event"),
        (SeatEvent::Denied, None) => warn!("Seat event"),
        (_, Some(d)) => info!(details = %d, "Seat event"),
        (_, None) => info!("Seat event"),
    }
}

/// Kinds of rows written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    AdminLogin,
    UserCreated,
    UserUpdated,
    UserStatusChanged,
    UserDeleted,
    VerifyAllowed,
    VerifyDenied,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::AdminLogin => "admin_login",
            AuditKind::UserCreated => "user_created",
            AuditKind::UserUpdated => "user_updated",
            AuditKind::UserStatusChanged => "user_status_changed",
            AuditKind::UserDeleted => "user_deleted",
            AuditKind::VerifyAllowed => "verify_allowed",
            AuditKind::VerifyDenied => "verify_denied",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
///
/// This middleware:
/// 1. Generates a unique request ID for each incoming request
/// 2. Creates a tracing span with the request ID
/// 3. Logs the request method and path
/// 4. Measures and logs the response time
/// 5. Adds the request ID to the response headers
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status ("healthy" or "degraded")
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Database connectivity status
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    /// Whether the database answered a ping
    pub connected: bool,
    /// Database type (sqlite or postgres)
    pub db_type: String,
}

impl HealthResponse {
    pub fn healthy(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "seatgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}
