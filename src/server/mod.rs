//! Server-side components for Seatgate.
//!
//! This module contains:
//! - `database`    → DB abstraction over SQLite/Postgres
//! - `verifier`    → Verification decision and seat leasing
//! - `reaper`      → Stale lease removal
//! - `secrets`     → Argon2 hashing of user and admin secrets
//! - `client_api`  → Handlers for verify/release/error reports
//! - `handlers`    → Shared state and the health endpoint
//! - `routes`      → Router builder
//! - `bootstrap`   → First-admin setup and the `admin` CLI
//! - `auth`        → JWT admin sessions (requires `jwt-auth` feature)
//! - `admin`       → Admin API for users, stats, logs and reports (requires `admin-api` feature)
//! - `rate_limit`  → Rate limiting middleware (requires `rate-limiting` feature)
//! - `validation`  → Request validation utilities

pub mod api_error;
pub mod bootstrap;
pub mod client_api;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod reaper;
pub mod routes;
pub mod secrets;
pub mod validation;
pub mod verifier;

#[cfg(feature = "jwt-auth")]
pub mod auth;

#[cfg(feature = "admin-api")]
pub mod admin;

#[cfg(feature = "rate-limiting")]
pub mod rate_limit;

pub use api_error::{ApiError, ErrorCode};
pub use client_api::{
    release_handler, report_error_handler, verify_handler, ErrorReportRequest, MessageResponse,
    ReleaseRequest, VerifyRequest, VerifyResponse,
};
pub use database::{Database, Lease, LeaseAcquisition, User, UserStatus};
pub use handlers::{health_handler, AppState};
pub use reaper::LeaseReaper;
pub use routes::build_router;
pub use secrets::SecretHasher;
pub use verifier::{DenyReason, Grant, LicenseVerifier, VerifyOutcome};

#[cfg(feature = "jwt-auth")]
pub use auth::{
    login_handler, AuthError, AuthState, AuthenticatedAdmin, Claims, JwtValidator, LoginRequest,
    LoginResponse,
};

#[cfg(feature = "admin-api")]
pub use admin::{
    create_user_handler, delete_user_handler, list_error_reports_handler, list_logs_handler,
    list_users_handler, resolve_error_report_handler, stats_handler, toggle_status_handler,
    update_user_handler, CreateUserRequest, UpdateUserRequest, UserResponse,
};

#[cfg(feature = "rate-limiting")]
pub use rate_limit::{create_rate_limiter, RateLimitType, SmartIpKeyExtractor};

pub use validation::{
    validate_email, validate_length, validate_not_empty, ValidationError, ValidationResult,
};

pub use bootstrap::{
    bootstrap_admin_from_env, execute_admin_command, parse_admin_command, AdminCommand,
};
